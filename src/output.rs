// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出管理
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use image::RgbImage;
use tracing::{info, warn};

use crate::input::InputKind;

pub mod direct_write;
pub mod disk_buffer;
pub mod draw;
pub mod live_push;
pub mod snapshot;
pub mod transcoder;
pub mod video_writer;

#[cfg(feature = "gstreamer_output")]
pub mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoBackend, GStreamerVideoOutputError};

pub use self::direct_write::DirectWriteSink;
pub use self::disk_buffer::DiskBufferSink;
pub use self::live_push::LivePushSink;
pub use self::transcoder::{FfmpegTranscoder, PushHandle, Transcoder, WriteStatus};
pub use self::video_writer::{FfmpegVideoBackend, FrameWriter, VideoBackend};

/// 交给输出的已标注帧
pub struct SinkFrame<'a> {
  pub image: &'a RgbImage,
  pub index: u64,
  pub timestamp: f64,
  /// 源帧率，图像序列为 `None`
  pub source_fps: Option<f64>,
}

/// 由命令行整理出的输出需求
#[derive(Debug, Clone)]
pub struct SinkRequest {
  pub out_video: Option<PathBuf>,
  /// 强制输出帧率，未指定为 `None`
  pub out_fps: Option<f64>,
  /// 流采集时长（秒），0 表示不限
  pub duration: f64,
  pub push: Option<String>,
  pub buffer_capacity: usize,
  /// 缓冲临时目录所在位置
  pub scratch_root: PathBuf,
  pub input_kind: InputKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkMode {
  None,
  DirectWrite {
    path: PathBuf,
    forced_fps: Option<f64>,
  },
  DiskBuffer {
    path: PathBuf,
    duration: f64,
    scratch_root: PathBuf,
    capacity: usize,
  },
  LivePush {
    target: String,
    forced_fps: Option<f64>,
  },
}

/// 本次运行的输出配置
///
/// 文件输出（直接写入或磁盘缓冲，二选一）与推流相互独立。
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
  file: SinkMode,
  push: SinkMode,
}

impl SinkConfig {
  pub fn select(request: &SinkRequest) -> Self {
    let file = match &request.out_video {
      Some(path)
        if request.input_kind.is_stream() && request.duration > 0.0 && request.out_fps.is_none() =>
      {
        SinkMode::DiskBuffer {
          path: path.clone(),
          duration: request.duration,
          scratch_root: request.scratch_root.clone(),
          capacity: request.buffer_capacity,
        }
      }
      Some(path) => SinkMode::DirectWrite {
        path: path.clone(),
        forced_fps: request.out_fps,
      },
      None => SinkMode::None,
    };

    let push = match &request.push {
      Some(target) if request.input_kind.is_video() => SinkMode::LivePush {
        target: target.clone(),
        forced_fps: request.out_fps,
      },
      Some(target) => {
        warn!("图像输入不支持推流，忽略推流地址 {}", target);
        SinkMode::None
      }
      None => SinkMode::None,
    };

    Self { file, push }
  }

  pub fn file(&self) -> &SinkMode {
    &self.file
  }

  pub fn push(&self) -> &SinkMode {
    &self.push
  }

  /// 已启用的输出
  pub fn modes(&self) -> impl Iterator<Item = &SinkMode> {
    [&self.file, &self.push]
      .into_iter()
      .filter(|m| !matches!(m, SinkMode::None))
  }

  pub fn is_none(&self) -> bool {
    self.modes().next().is_none()
  }
}

enum FileSink<W> {
  None,
  Direct(DirectWriteSink<W>),
  Buffer(DiskBufferSink),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
  /// 直接写入或缓冲的帧数
  pub file_frames: u64,
  pub pushed_frames: u64,
}

/// 输出管理器
///
/// 每帧按输入顺序依次交给推流与文件输出；任一输出降级都不影响其它输出。
pub struct SinkManager<B: VideoBackend, T: Transcoder> {
  backend: B,
  transcoder: T,
  file: FileSink<B::Writer>,
  push: Option<LivePushSink<T::Handle>>,
}

impl<B: VideoBackend, T: Transcoder> SinkManager<B, T> {
  pub fn new(config: &SinkConfig, backend: B, transcoder: T) -> Self {
    let file = match config.file() {
      SinkMode::DirectWrite { path, forced_fps } => {
        info!("输出模式: 直接写入 {}", path.display());
        FileSink::Direct(DirectWriteSink::new(path, *forced_fps))
      }
      SinkMode::DiskBuffer {
        path,
        duration,
        scratch_root,
        capacity,
      } => {
        info!("输出模式: 磁盘缓冲 {} ({}s)", path.display(), duration);
        FileSink::Buffer(DiskBufferSink::new(path, *duration, scratch_root, *capacity))
      }
      _ => FileSink::None,
    };

    let push = match config.push() {
      SinkMode::LivePush { target, forced_fps } => {
        info!("输出模式: 推流 {}", target);
        Some(LivePushSink::new(target, *forced_fps))
      }
      _ => None,
    };

    Self {
      backend,
      transcoder,
      file,
      push,
    }
  }

  pub fn dispatch(&mut self, frame: &SinkFrame) {
    if let Some(push) = &mut self.push {
      push.write(&self.transcoder, frame);
    }

    match &mut self.file {
      FileSink::Direct(sink) => sink.write(&self.backend, frame),
      FileSink::Buffer(sink) => sink.write(frame),
      FileSink::None => {}
    }
  }

  /// 关闭所有输出，磁盘缓冲在此拼接
  pub fn finish(self) -> SinkReport {
    let pushed_frames = self.push.map(LivePushSink::finish).unwrap_or(0);
    let file_frames = match self.file {
      FileSink::Direct(sink) => sink.finish(),
      FileSink::Buffer(sink) => sink.finish(&self.transcoder),
      FileSink::None => 0,
    };

    SinkReport {
      file_frames,
      pushed_frames,
    }
  }
}
