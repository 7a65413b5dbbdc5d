// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::frame::Frame;

mod read_image_file;
pub use self::read_image_file::{IMAGE_EXTENSIONS, ImageSequenceInput};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

/// 识别为网络流的 URL scheme
pub const STREAM_SCHEMES: [&str; 7] = ["rtsp", "rtmp", "http", "https", "udp", "tcp", "hls"];
/// 识别为视频文件的扩展名
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "flv"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入路径不存在: {0}")]
  NotFound(String),
  #[error("无法识别的输入文件: {0}")]
  Unrecognized(String),
  #[error("目录中没有图像文件: {0}")]
  NoFrames(String),
  #[error("图像读取失败 {path}: {source}")]
  Image {
    path: String,
    source: image::ImageError,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("当前构建不支持该输入: {0}")]
  Unsupported(String),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
  /// 图像目录或单张图像
  ImageSequence,
  /// 本地视频文件
  VideoFile,
  /// 网络流
  Stream,
}

impl InputKind {
  /// 视频文件与网络流都带有源时钟
  pub fn is_video(&self) -> bool {
    !matches!(self, InputKind::ImageSequence)
  }

  pub fn is_stream(&self) -> bool {
    matches!(self, InputKind::Stream)
  }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    .unwrap_or(false)
}

pub(crate) fn is_image_file(path: &Path) -> bool {
  has_extension(path, &IMAGE_EXTENSIONS)
}

/// 判断输入类型：网络流按 scheme 识别，其余按文件系统判断
pub fn classify_input(source: &str) -> Result<InputKind, InputError> {
  if let Ok(url) = url::Url::parse(source)
    && STREAM_SCHEMES.contains(&url.scheme())
  {
    return Ok(InputKind::Stream);
  }

  let path = Path::new(source);
  if path.is_dir() {
    return Ok(InputKind::ImageSequence);
  }
  if !path.exists() {
    return Err(InputError::NotFound(source.to_string()));
  }
  if has_extension(path, &VIDEO_EXTENSIONS) {
    Ok(InputKind::VideoFile)
  } else if is_image_file(path) {
    Ok(InputKind::ImageSequence)
  } else {
    Err(InputError::Unrecognized(source.to_string()))
  }
}

/// 帧来源
///
/// 逐帧产出；单帧解码失败以 `Err` 返回，迭代可以继续。
pub trait FrameSource: Iterator<Item = Result<Frame, InputError>> {
  fn kind(&self) -> InputKind;

  /// 源帧率；图像序列没有源帧率
  fn fps(&self) -> Option<f64>;

  /// 最近一帧对应的文件名，用于日志
  fn current_name(&self) -> Option<&str> {
    None
  }
}

pub enum InputWrapper {
  ImageSequence(ImageSequenceInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

/// 按输入类型打开帧来源；`image_fps` 为图像序列的假定帧率
pub fn open_input(source: &str, image_fps: f64) -> Result<InputWrapper, InputError> {
  let kind = classify_input(source)?;
  info!("输入 {} 识别为 {:?}", source, kind);

  match kind {
    InputKind::ImageSequence => Ok(InputWrapper::ImageSequence(
      ImageSequenceInput::from_path(source, image_fps)?,
    )),
    #[cfg(feature = "gstreamer_input")]
    InputKind::VideoFile => Ok(InputWrapper::GStreamer(GStreamerInput::open_file(source)?)),
    #[cfg(feature = "gstreamer_input")]
    InputKind::Stream => {
      use crate::FromUrl;

      let url = url::Url::parse(source).map_err(|_| InputError::Unrecognized(source.to_string()))?;
      Ok(InputWrapper::GStreamer(GStreamerInput::from_url(&url)?))
    }
    #[cfg(not(feature = "gstreamer_input"))]
    InputKind::VideoFile | InputKind::Stream => Err(InputError::Unsupported(format!(
      "{}（需要启用 gstreamer_input 特性）",
      source
    ))),
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageSequence(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn kind(&self) -> InputKind {
    match self {
      InputWrapper::ImageSequence(input) => input.kind(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.kind(),
    }
  }

  fn fps(&self) -> Option<f64> {
    match self {
      InputWrapper::ImageSequence(input) => input.fps(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.fps(),
    }
  }

  fn current_name(&self) -> Option<&str> {
    match self {
      InputWrapper::ImageSequence(input) => input.current_name(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.current_name(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch(tag: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .unwrap()
      .as_nanos();
    let dir = std::env::temp_dir().join(format!("shanan_input_{}_{}_{}", tag, std::process::id(), nanos));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn stream_schemes_are_case_insensitive() {
    assert_eq!(classify_input("rtsp://10.0.0.2:554/live").unwrap(), InputKind::Stream);
    assert_eq!(classify_input("RTMP://host/app/key").unwrap(), InputKind::Stream);
    assert_eq!(classify_input("hls://cdn/index.m3u8").unwrap(), InputKind::Stream);
    assert!(InputKind::Stream.is_video());
    assert!(!InputKind::ImageSequence.is_video());
  }

  #[test]
  fn classifies_filesystem_inputs() {
    let dir = scratch("classify");
    let video = dir.join("clip.MP4");
    let image = dir.join("shot.jpeg");
    let other = dir.join("notes.txt");
    for p in [&video, &image, &other] {
      std::fs::write(p, b"x").unwrap();
    }

    let s = |p: &Path| p.to_str().unwrap().to_string();
    assert_eq!(classify_input(&s(&dir)).unwrap(), InputKind::ImageSequence);
    assert_eq!(classify_input(&s(&video)).unwrap(), InputKind::VideoFile);
    assert_eq!(classify_input(&s(&image)).unwrap(), InputKind::ImageSequence);
    assert!(matches!(classify_input(&s(&other)), Err(InputError::Unrecognized(_))));
    assert!(matches!(
      classify_input(&s(&dir.join("missing"))),
      Err(InputError::NotFound(_))
    ));

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn empty_directory_has_no_frames() {
    let dir = scratch("empty");
    let err = open_input(dir.to_str().unwrap(), 30.0).err().unwrap();
    assert!(matches!(err, InputError::NoFrames(_)));
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
