// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/direct_write.rs - 直接写入视频文件
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

use std::{borrow::Cow, path::PathBuf};

use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::output::{
  SinkFrame,
  video_writer::{CODEC_PREFERENCE, Codec, FrameWriter, VideoBackend},
};

/// 没有强制帧率且源帧率不可用时的写入帧率
pub const DIRECT_WRITE_DEFAULT_FPS: f64 = 29.0;

/// 强制帧率优先，其次是大于 1 的源帧率
pub fn resolve_direct_fps(forced: Option<f64>, source: Option<f64>) -> f64 {
  forced
    .filter(|&f| f > 0.0)
    .or(source.filter(|&f| f > 1.0))
    .unwrap_or(DIRECT_WRITE_DEFAULT_FPS)
}

enum WriterState<W> {
  /// 等待第一帧确定尺寸
  Pending,
  Open {
    writer: W,
    codec: Codec,
    size: (u32, u32),
  },
  Disabled,
}

/// 逐帧直接写入视频文件
///
/// 第一帧到达时按编码器偏好顺序打开写入器；全部失败则禁用，帧照常标注和告警。
pub struct DirectWriteSink<W> {
  path: PathBuf,
  forced_fps: Option<f64>,
  state: WriterState<W>,
  frames: u64,
}

impl<W: FrameWriter> DirectWriteSink<W> {
  pub fn new(path: impl Into<PathBuf>, forced_fps: Option<f64>) -> Self {
    Self {
      path: path.into(),
      forced_fps,
      state: WriterState::Pending,
      frames: 0,
    }
  }

  pub fn is_disabled(&self) -> bool {
    matches!(self.state, WriterState::Disabled)
  }

  pub fn codec(&self) -> Option<Codec> {
    match &self.state {
      WriterState::Open { codec, .. } => Some(*codec),
      _ => None,
    }
  }

  fn open<B: VideoBackend<Writer = W>>(&mut self, backend: &B, frame: &SinkFrame) {
    let fps = resolve_direct_fps(self.forced_fps, frame.source_fps);
    let (width, height) = frame.image.dimensions();

    for codec in CODEC_PREFERENCE {
      match backend.open(&self.path, codec, fps, width, height) {
        Ok(writer) => {
          info!(
            "视频写入器已打开: {} ({}, {:.3} fps)",
            self.path.display(),
            codec.fourcc(),
            fps
          );
          self.state = WriterState::Open {
            writer,
            codec,
            size: (width, height),
          };
          return;
        }
        Err(e) => debug!("编码 {} 打开失败: {}", codec.fourcc(), e),
      }
    }

    warn!(
      "无法打开任何视频写入器: {}，继续处理但不写入视频文件",
      self.path.display()
    );
    self.state = WriterState::Disabled;
  }

  pub fn write<B: VideoBackend<Writer = W>>(&mut self, backend: &B, frame: &SinkFrame) {
    if matches!(self.state, WriterState::Pending) {
      self.open(backend, frame);
    }

    let WriterState::Open { writer, size, .. } = &mut self.state else {
      return;
    };

    // 图像序列的尺寸可能不一致，统一缩放到写入器尺寸
    let (w, h) = *size;
    let image = if frame.image.dimensions() != (w, h) {
      debug!("帧 {} 尺寸不一致，缩放到 {}x{}", frame.index, w, h);
      Cow::Owned(image::imageops::resize(frame.image, w, h, FilterType::Triangle))
    } else {
      Cow::Borrowed(frame.image)
    };

    if let Err(e) = writer.write_frame(&image) {
      warn!("写入视频帧失败，停止写入视频文件: {}", e);
      self.disable();
      return;
    }
    self.frames += 1;
  }

  fn disable(&mut self) {
    if let WriterState::Open { writer, .. } = std::mem::replace(&mut self.state, WriterState::Disabled)
      && let Err(e) = writer.finish()
    {
      warn!("关闭视频写入器失败: {}", e);
    }
  }

  pub fn finish(self) -> u64 {
    if let WriterState::Open { writer, .. } = self.state {
      match writer.finish() {
        Ok(n) => info!("视频已保存: {} ({} 帧)", self.path.display(), n),
        Err(e) => warn!("关闭视频写入器失败: {}", e),
      }
    }
    self.frames
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forced_rate_wins_over_source_rate() {
    assert_eq!(resolve_direct_fps(Some(12.0), Some(25.0)), 12.0);
    assert_eq!(resolve_direct_fps(None, Some(25.0)), 25.0);
  }

  #[test]
  fn unusable_source_rate_falls_back_to_default() {
    assert_eq!(resolve_direct_fps(None, None), DIRECT_WRITE_DEFAULT_FPS);
    assert_eq!(resolve_direct_fps(None, Some(1.0)), DIRECT_WRITE_DEFAULT_FPS);
    assert_eq!(resolve_direct_fps(Some(0.0), Some(0.5)), DIRECT_WRITE_DEFAULT_FPS);
  }
}
