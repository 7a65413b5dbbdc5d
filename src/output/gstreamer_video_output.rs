// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出
//!
//! appsrc 接收 RGB 帧，经编码、封装后写入文件。封装格式按扩展名选择：
//!
//! - **mp4** / **mov** - mp4mux / qtmux
//! - **mkv** - matroskamux
//! - **avi** - avimux
//! - **flv** - flvmux
//!
//! 编码器元素不存在时视为该编码不可用，由上层切换到下一个候选。

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::output::video_writer::{Codec, FrameWriter, VideoBackend, VideoWriterError};

const EOS_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsrc 元素")]
  AppSrcNotFound,
  #[error("无法转换为 appsrc")]
  AppSrcConversionFailed,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("状态切换失败: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("推送缓冲区失败: {0:?}")]
  FlowError(gst::FlowError),
}

fn encoder_element(codec: Codec) -> (&'static str, Option<&'static str>) {
  match codec {
    Codec::Avc1 => ("x264enc speed-preset=fast", Some("h264parse")),
    Codec::X264 => ("x264enc", Some("h264parse")),
    Codec::H264 => ("openh264enc", Some("h264parse")),
    Codec::Mp4v => ("avenc_mpeg4", Some("mpeg4videoparse")),
    Codec::Mjpg => ("jpegenc", None),
  }
}

fn muxer_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "mov" => "qtmux",
    "mkv" => "matroskamux",
    "avi" => "avimux",
    "flv" => "flvmux",
    _ => "mp4mux",
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GStreamerVideoBackend;

impl GStreamerVideoBackend {
  pub fn new() -> Result<Self, GStreamerVideoOutputError> {
    gst::init()?;
    Ok(Self)
  }
}

impl VideoBackend for GStreamerVideoBackend {
  type Writer = GStreamerVideoOutput;

  fn open(
    &self,
    path: &Path,
    codec: Codec,
    fps: f64,
    width: u32,
    height: u32,
  ) -> Result<Self::Writer, VideoWriterError> {
    let (encoder, parser) = encoder_element(codec);
    let factory = encoder.split_whitespace().next().unwrap_or(encoder);
    if gst::ElementFactory::find(factory).is_none() {
      debug!("GStreamer 编码器 {} 不存在", factory);
      return Err(VideoWriterError::UnsupportedCodec(codec));
    }

    let mut stages = vec![
      "appsrc name=src".to_string(),
      "videoconvert".to_string(),
      "video/x-raw,format=I420".to_string(),
      encoder.to_string(),
    ];
    if let Some(parser) = parser {
      stages.push(parser.to_string());
    }
    stages.push(muxer_for(path).to_string());
    stages.push(format!("filesink location=\"{}\"", path.display()));
    let description = stages.join(" ! ");
    info!("GStreamer 视频输出管道: {}", description);

    Ok(GStreamerVideoOutput::launch(&description, fps, width, height)?)
  }
}

/// 基于 appsrc 的视频文件写入
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: f64,
  size: (u32, u32),
  frame_count: u64,
}

impl GStreamerVideoOutput {
  fn launch(
    description: &str,
    fps: f64,
    width: u32,
    height: u32,
  ) -> Result<Self, GStreamerVideoOutputError> {
    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    let framerate = gst::Fraction::approximate_f64(fps).unwrap_or(gst::Fraction::new(25, 1));
    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", framerate)
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    Ok(Self {
      pipeline,
      appsrc,
      fps: fps.max(1.0),
      size: (width, height),
      frame_count: 0,
    })
  }

  fn push_frame(&mut self, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let mut buffer = gst::Buffer::from_slice(data.to_vec());
    let pts = (self.frame_count as f64 * 1e9 / self.fps) as u64;
    let duration = (1e9 / self.fps) as u64;
    if let Some(buffer_ref) = buffer.get_mut() {
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(GStreamerVideoOutputError::FlowError)?;
    self.frame_count += 1;
    Ok(())
  }
}

impl FrameWriter for GStreamerVideoOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), VideoWriterError> {
    if image.dimensions() != self.size {
      return Err(VideoWriterError::SizeMismatch {
        expected: self.size,
        actual: image.dimensions(),
      });
    }
    Ok(self.push_frame(image.as_raw())?)
  }

  fn finish(self) -> Result<u64, VideoWriterError> {
    self
      .appsrc
      .end_of_stream()
      .map_err(GStreamerVideoOutputError::FlowError)?;

    // 等待 EOS 走完整条管道，文件尾才会写入
    if let Some(bus) = self.pipeline.bus() {
      let message = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
      match message.as_ref().map(|m| m.view()) {
        Some(gst::MessageView::Error(err)) => {
          return Err(
            GStreamerVideoOutputError::PipelineError(err.error().to_string()).into(),
          );
        }
        Some(_) => {}
        None => warn!("等待 EOS 超时"),
      }
    }

    info!("视频输出关闭，共写入 {} 帧", self.frame_count);
    Ok(self.frame_count)
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 视频输出管道失败: {}", e);
    }
  }
}
