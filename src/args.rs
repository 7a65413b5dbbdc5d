// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use shanan_guard::{
  alarm::DEFAULT_ALARM_CLASSES,
  input::InputKind,
  output::{SinkRequest, disk_buffer::DEFAULT_BUFFER_CAPACITY, transcoder::DEFAULT_FFMPEG},
  task::{DEFAULT_PROGRESS_EVERY, TaskOptions},
};

/// 安全装备检测：标注、告警截图与视频输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// RKNN 模型文件路径
  #[arg(long, value_name = "FILE")]
  pub model: PathBuf,

  /// 输入来源
  /// 支持格式:
  /// - 图片目录或单张图片: *.png, *.jpg, *.jpeg, *.bmp
  /// - 视频: *.mp4, *.avi, *.mov, *.mkv, *.flv
  /// - 网络流: rtsp://, rtmp://, http(s)://, udp://, tcp://, hls://
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 输出目录
  #[arg(long, value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 模型输入宽度
  #[arg(long, value_name = "W")]
  pub input_width: u32,

  /// 模型输入高度
  #[arg(long, value_name = "H")]
  pub input_height: u32,

  /// 类别名称文件，每行一个类别
  #[arg(long, value_name = "FILE")]
  pub names: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub conf: f32,

  /// 日志级别: 0 = 错误, 1 = 信息, 2 = 调试
  #[arg(long, default_value = "1", value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=2))]
  pub log_level: u8,

  /// 告警截图目录（默认为 <输出目录>/alarms）
  #[arg(long, value_name = "DIR")]
  pub alarm_dir: Option<PathBuf>,

  /// 图像序列的假定帧率
  #[arg(long, default_value = "30", value_name = "FPS")]
  pub img_fps: f64,

  /// 输出视频路径
  #[arg(long, value_name = "PATH")]
  pub out_video: Option<PathBuf>,

  /// 强制输出帧率
  #[arg(long, value_name = "FPS")]
  pub out_fps: Option<f64>,

  /// 流输入的最长采集时长（秒，0 表示不限）
  #[arg(long, default_value = "0", value_name = "SECS")]
  pub duration: f64,

  /// 推流地址，例如 rtmp://host/live/stream
  #[arg(long, value_name = "URL")]
  pub push: Option<String>,

  /// 缓冲帧数容量提示
  #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY, value_name = "N")]
  pub buffer_cap: usize,

  /// 告警类别（可重复指定）
  #[arg(long = "alarm-class", value_name = "NAME", default_values_t = DEFAULT_ALARM_CLASSES.map(String::from))]
  pub alarm_classes: Vec<String>,

  /// 在告警截图旁写入 JSON 检测记录
  #[arg(long)]
  pub alarm_record: bool,

  /// 标签字体文件
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// ffmpeg 可执行文件
  #[arg(long, default_value = DEFAULT_FFMPEG, value_name = "PROGRAM")]
  pub ffmpeg: String,
}

impl Args {
  pub fn max_level(&self) -> Level {
    match self.log_level {
      0 => Level::ERROR,
      1 => Level::INFO,
      _ => Level::DEBUG,
    }
  }

  pub fn alarm_dir(&self) -> PathBuf {
    self
      .alarm_dir
      .clone()
      .unwrap_or_else(|| self.output_dir.join("alarms"))
  }

  pub fn task_options(&self) -> TaskOptions {
    TaskOptions {
      model_width: self.input_width,
      model_height: self.input_height,
      confidence: self.conf,
      max_duration: self.duration,
      progress_every: DEFAULT_PROGRESS_EVERY,
    }
  }

  pub fn sink_request(&self, input_kind: InputKind) -> SinkRequest {
    SinkRequest {
      out_video: self.out_video.clone(),
      out_fps: self.out_fps.filter(|&f| f > 0.0),
      duration: self.duration,
      push: self.push.clone(),
      buffer_capacity: self.buffer_cap,
      scratch_root: self.output_dir.clone(),
      input_kind,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(extra: &[&str]) -> Args {
    let mut argv = vec![
      "shanan-guard",
      "--model",
      "m.rknn",
      "--input",
      "rtsp://cam/1",
      "--output-dir",
      "/out",
      "--input-width",
      "640",
      "--input-height",
      "640",
      "--names",
      "names.txt",
    ];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
  }

  #[test]
  fn defaults() {
    let args = parse(&[]);
    assert_eq!(args.conf, 0.25);
    assert_eq!(args.max_level(), Level::INFO);
    assert_eq!(args.alarm_dir(), PathBuf::from("/out/alarms"));
    assert_eq!(args.img_fps, 30.0);
    assert_eq!(args.buffer_cap, 8192);
    assert_eq!(args.alarm_classes, vec!["no_vest", "head"]);
    assert_eq!(args.ffmpeg, "ffmpeg");
  }

  #[test]
  fn zero_out_fps_means_not_forced() {
    let args = parse(&["--out-fps", "0", "--duration", "10", "--out-video", "/out/a.mp4"]);
    let request = args.sink_request(InputKind::Stream);
    assert_eq!(request.out_fps, None);
    assert_eq!(request.duration, 10.0);
  }

  #[test]
  fn log_level_is_bounded() {
    let argv = [
      "shanan-guard",
      "--model",
      "m",
      "--input",
      "i",
      "--output-dir",
      "o",
      "--input-width",
      "1",
      "--input-height",
      "1",
      "--names",
      "n",
      "--log-level",
      "3",
    ];
    assert!(Args::try_parse_from(argv).is_err());
  }
}
