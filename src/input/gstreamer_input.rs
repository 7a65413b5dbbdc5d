// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入
//!
//! 视频文件走 `filesrc ! decodebin`，网络流走 `uridecodebin`，
//! 统一转换为 RGB 后由 appsink 拉取。帧时间戳取缓冲区 PTS。
//!
//! 需要系统安装 GStreamer 开发库并启用 `gstreamer_input` 特性。

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::Frame,
  input::{FrameSource, InputKind, InputError},
};

const RGB_TAIL: &str = "videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false";

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("无法转换为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的像素格式: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态切换失败: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// 基于 GStreamer appsink 的视频/流输入
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  kind: InputKind,
  fps: Option<f64>,
  index: u64,
  finished: bool,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl FromUrl for GStreamerInput {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let description = format!("uridecodebin uri=\"{}\" ! {}", url.as_str(), RGB_TAIL);
    Self::launch(&description, InputKind::Stream)
  }
}

impl GStreamerInput {
  pub fn open_file(path: &str) -> Result<Self, GStreamerInputError> {
    let description = format!("filesrc location=\"{}\" ! decodebin ! {}", path, RGB_TAIL);
    Self::launch(&description, InputKind::VideoFile)
  }

  fn launch(description: &str, kind: InputKind) -> Result<Self, GStreamerInputError> {
    gst::init()?;
    info!("GStreamer 输入管道: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(Self {
      pipeline,
      appsink,
      kind,
      fps: None,
      index: 0,
      finished: false,
    })
  }

  fn convert(&mut self, sample: gst::Sample) -> Result<Frame, GStreamerInputError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    if self.fps.is_none() {
      let fps = video_info.fps();
      if fps.numer() > 0 && fps.denom() > 0 {
        let fps = fps.numer() as f64 / fps.denom() as f64;
        info!("源帧率: {:.3}", fps);
        self.fps = Some(fps);
      }
    }

    let format = video_info.format();
    if format != gst_video::VideoFormat::Rgb {
      return Err(GStreamerInputError::UnsupportedFormat(format));
    }

    let width = video_info.width() as usize;
    let height = video_info.height() as usize;
    let stride = video_info.stride()[0] as usize;
    let row = width * 3;

    let map = buffer
      .map_readable()
      .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
    let data = map.as_slice();
    let expected = stride * height.saturating_sub(1) + row;
    if data.len() < expected {
      return Err(GStreamerInputError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    let mut pixels = Vec::with_capacity(row * height);
    for y in 0..height {
      pixels.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    let image = RgbImage::from_raw(width as u32, height as u32, pixels)
      .ok_or_else(|| GStreamerInputError::PipelineError("帧尺寸与数据不符".to_string()))?;

    let index = self.index;
    let timestamp = match buffer.pts() {
      Some(pts) => pts.nseconds() as f64 / 1e9,
      None => index as f64 / self.fps.unwrap_or(1.0).max(1.0),
    };
    Ok(Frame::new(image, index, timestamp))
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(_) => {
        // EOS 或管道出错都表现为拉取失败
        debug!("appsink 没有更多样本");
        self.finished = true;
        return None;
      }
    };

    let frame = self.convert(sample);
    self.index += 1;
    Some(frame.map_err(InputError::from))
  }
}

impl FrameSource for GStreamerInput {
  fn kind(&self) -> InputKind {
    self.kind
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }
}
