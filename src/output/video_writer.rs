// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/video_writer.rs - 视频文件写入
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

use std::{
  cell::OnceCell,
  io::Write,
  path::Path,
  process::{Child, ChildStdin, Command, Stdio},
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::output::transcoder::EVEN_SIZE_FILTER;

#[cfg(feature = "gstreamer_output")]
use crate::output::gstreamer_video_output::GStreamerVideoOutputError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
  Avc1,
  X264,
  H264,
  Mp4v,
  Mjpg,
}

/// 按顺序尝试，第一个能打开的编码器生效
pub const CODEC_PREFERENCE: [Codec; 5] = [
  Codec::Avc1,
  Codec::X264,
  Codec::H264,
  Codec::Mp4v,
  Codec::Mjpg,
];

impl Codec {
  pub fn fourcc(&self) -> &'static str {
    match self {
      Codec::Avc1 => "avc1",
      Codec::X264 => "X264",
      Codec::H264 => "H264",
      Codec::Mp4v => "mp4v",
      Codec::Mjpg => "MJPG",
    }
  }

  /// 对应的 ffmpeg 编码器；avc1 与 X264 都落到 libx264
  pub fn ffmpeg_encoder(&self) -> &'static str {
    match self {
      Codec::Avc1 | Codec::X264 => "libx264",
      Codec::H264 => "libopenh264",
      Codec::Mp4v => "mpeg4",
      Codec::Mjpg => "mjpeg",
    }
  }

  pub fn ffmpeg_pix_fmt(&self) -> &'static str {
    match self {
      Codec::Mjpg => "yuvj420p",
      _ => "yuv420p",
    }
  }
}

#[derive(Error, Debug)]
pub enum VideoWriterError {
  #[error("编码器不可用: {0:?}")]
  UnsupportedCodec(Codec),
  #[error("无法启动 {program}: {source}")]
  Spawn {
    program: String,
    source: std::io::Error,
  },
  #[error("帧尺寸不一致: 期望 {expected:?}, 实际 {actual:?}")]
  SizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("编码进程异常退出: {0}")]
  Exit(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamer(#[from] GStreamerVideoOutputError),
}

pub trait FrameWriter {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), VideoWriterError>;

  /// 收尾并返回写入的帧数
  fn finish(self) -> Result<u64, VideoWriterError>;
}

pub trait VideoBackend {
  type Writer: FrameWriter;

  fn open(
    &self,
    path: &Path,
    codec: Codec,
    fps: f64,
    width: u32,
    height: u32,
  ) -> Result<Self::Writer, VideoWriterError>;
}

/// 以原始 RGB 帧喂给 ffmpeg 的视频写入后端
pub struct FfmpegVideoBackend {
  program: String,
  encoders: OnceCell<Option<String>>,
}

impl FfmpegVideoBackend {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      encoders: OnceCell::new(),
    }
  }

  /// `ffmpeg -encoders` 的输出只查询一次
  fn encoder_list(&self) -> Option<&str> {
    self
      .encoders
      .get_or_init(|| {
        match Command::new(&self.program)
          .args(["-hide_banner", "-encoders"])
          .stdin(Stdio::null())
          .output()
        {
          Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
          }
          Ok(output) => {
            warn!("查询编码器失败: {}", output.status);
            None
          }
          Err(e) => {
            warn!("无法执行 {}: {}", self.program, e);
            None
          }
        }
      })
      .as_deref()
  }

  fn has_encoder(&self, name: &str) -> bool {
    self
      .encoder_list()
      .map(|list| {
        list
          .lines()
          .any(|line| line.split_whitespace().nth(1) == Some(name))
      })
      .unwrap_or(false)
  }
}

impl FfmpegVideoBackend {
  /// 不含输出路径的 ffmpeg 参数；奇数尺寸由滤镜补齐，编码器打开后不会因尺寸失败
  pub fn writer_args(codec: Codec, fps: f64, width: u32, height: u32) -> Vec<String> {
    let size = format!("{}x{}", width, height);
    let rate = format!("{:.3}", fps);
    [
      "-y",
      "-loglevel",
      "error",
      "-f",
      "rawvideo",
      "-pix_fmt",
      "rgb24",
      "-s",
      size.as_str(),
      "-r",
      rate.as_str(),
      "-i",
      "-",
      "-vf",
      EVEN_SIZE_FILTER,
      "-c:v",
      codec.ffmpeg_encoder(),
      "-pix_fmt",
      codec.ffmpeg_pix_fmt(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
  }
}

impl VideoBackend for FfmpegVideoBackend {
  type Writer = FfmpegFrameWriter;

  fn open(
    &self,
    path: &Path,
    codec: Codec,
    fps: f64,
    width: u32,
    height: u32,
  ) -> Result<Self::Writer, VideoWriterError> {
    let encoder = codec.ffmpeg_encoder();
    if !self.has_encoder(encoder) {
      return Err(VideoWriterError::UnsupportedCodec(codec));
    }

    let mut command = Command::new(&self.program);
    command
      .args(Self::writer_args(codec, fps, width, height))
      .arg(path)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::inherit());
    debug!("视频写入命令: {:?}", command);

    let mut child = command.spawn().map_err(|source| VideoWriterError::Spawn {
      program: self.program.clone(),
      source,
    })?;
    let stdin = child.stdin.take().ok_or_else(|| {
      VideoWriterError::IoError(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    })?;

    info!(
      "打开视频写入 {} ({}), {}x{} @ {:.3} fps",
      path.display(),
      codec.fourcc(),
      width,
      height,
      fps
    );

    Ok(FfmpegFrameWriter {
      child,
      stdin: Some(stdin),
      size: (width, height),
      frames: 0,
    })
  }
}

pub struct FfmpegFrameWriter {
  child: Child,
  stdin: Option<ChildStdin>,
  size: (u32, u32),
  frames: u64,
}

impl FrameWriter for FfmpegFrameWriter {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), VideoWriterError> {
    if image.dimensions() != self.size {
      return Err(VideoWriterError::SizeMismatch {
        expected: self.size,
        actual: image.dimensions(),
      });
    }
    let stdin = self
      .stdin
      .as_mut()
      .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
    stdin.write_all(image.as_raw())?;
    self.frames += 1;
    Ok(())
  }

  fn finish(mut self) -> Result<u64, VideoWriterError> {
    drop(self.stdin.take());
    let status = self.child.wait()?;
    if status.success() {
      Ok(self.frames)
    } else {
      Err(VideoWriterError::Exit(status.to_string()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preference_order_is_fixed() {
    let names: Vec<&str> = CODEC_PREFERENCE.iter().map(Codec::fourcc).collect();
    assert_eq!(names, ["avc1", "X264", "H264", "mp4v", "MJPG"]);
  }

  #[test]
  fn odd_frame_size_is_padded_for_420_encoders() {
    for codec in CODEC_PREFERENCE {
      let line = FfmpegVideoBackend::writer_args(codec, 25.0, 641, 361).join(" ");
      assert!(line.contains("-s 641x361"));
      assert!(line.contains("-vf pad=ceil(iw/2)*2:ceil(ih/2)*2"));
      assert!(line.ends_with(codec.ffmpeg_pix_fmt()));
    }
  }

  #[test]
  fn missing_program_has_no_encoders() {
    let backend = FfmpegVideoBackend::new("/nonexistent/shanan-ffmpeg");
    for codec in CODEC_PREFERENCE {
      let err = backend
        .open(Path::new("/tmp/none.mp4"), codec, 25.0, 4, 4)
        .err()
        .unwrap();
      assert!(matches!(err, VideoWriterError::UnsupportedCodec(c) if c == codec));
    }
  }
}
