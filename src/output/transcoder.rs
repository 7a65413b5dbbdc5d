// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/transcoder.rs - 外部转码进程
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

//! 转码能力
//!
//! 推流与缓冲拼接都交给外部转码进程完成，这里只约定接口：
//! `open` 得到一个推流句柄，逐帧写入原始像素，最后 `close`；
//! `assemble` 把编号连续的图像序列拼接成视频。
//!
//! 默认实现为 ffmpeg 命令行，需要系统安装 ffmpeg。

use std::{
  io::{ErrorKind, Write},
  path::PathBuf,
  process::{Child, ChildStdin, Command, Stdio},
};

use thiserror::Error;
use tracing::{debug, error, info};

pub const DEFAULT_FFMPEG: &str = "ffmpeg";
/// 4:2:0 编码要求宽高为偶数，奇数尺寸在右下补一像素
pub const EVEN_SIZE_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

#[derive(Error, Debug)]
pub enum TranscodeError {
  #[error("无法启动 {program}: {source}")]
  Spawn {
    program: String,
    source: std::io::Error,
  },
  #[error("转码进程异常退出 ({status}): {stderr}")]
  Exit { status: String, stderr: String },
  #[error("转码进程没有标准输入")]
  StdinUnavailable,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 推流参数：原始 RGB 帧尺寸、目标帧率与推流地址
#[derive(Debug, Clone, PartialEq)]
pub struct PushParams {
  pub target: String,
  pub width: u32,
  pub height: u32,
  pub fps: f64,
}

/// 拼接参数：`pattern` 为 printf 风格的输入文件模式
#[derive(Debug, Clone, PartialEq)]
pub struct AssembleParams {
  pub pattern: PathBuf,
  pub fps: f64,
  pub output: PathBuf,
}

/// 单帧写入结果
#[derive(Debug)]
pub enum WriteStatus {
  Complete,
  /// 只写入了一部分，推流继续
  Partial { written: usize, expected: usize },
  /// 管道已断开，推流应当停止
  Failed(std::io::Error),
}

pub trait PushHandle {
  fn write_frame(&mut self, data: &[u8]) -> WriteStatus;

  fn close(self) -> Result<(), TranscodeError>;
}

pub trait Transcoder {
  type Handle: PushHandle;

  fn open(&self, params: &PushParams) -> Result<Self::Handle, TranscodeError>;

  fn assemble(&self, params: &AssembleParams) -> Result<(), TranscodeError>;
}

/// 按推流地址的 scheme 选择封装格式
pub fn push_muxer(target: &str) -> &'static str {
  let scheme = url::Url::parse(target)
    .map(|u| u.scheme().to_string())
    .unwrap_or_default();
  match scheme.as_str() {
    "rtsp" => "rtsp",
    "udp" | "tcp" | "srt" => "mpegts",
    _ => "flv",
  }
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
  program: String,
}

impl Default for FfmpegTranscoder {
  fn default() -> Self {
    Self::new(DEFAULT_FFMPEG)
  }
}

impl FfmpegTranscoder {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
    }
  }

  pub fn push_args(params: &PushParams) -> Vec<String> {
    [
      "-y",
      "-loglevel",
      "error",
      "-f",
      "rawvideo",
      "-pix_fmt",
      "rgb24",
      "-s",
      format!("{}x{}", params.width, params.height).as_str(),
      "-r",
      format!("{:.2}", params.fps).as_str(),
      "-i",
      "-",
      "-vf",
      EVEN_SIZE_FILTER,
      "-c:v",
      "libx264",
      "-preset",
      "veryfast",
      "-tune",
      "zerolatency",
      "-pix_fmt",
      "yuv420p",
      "-f",
      push_muxer(&params.target),
      params.target.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
  }

  pub fn assemble_args(params: &AssembleParams) -> Vec<String> {
    [
      "-y",
      "-loglevel",
      "error",
      "-framerate",
      format!("{:.6}", params.fps).as_str(),
      "-i",
      params.pattern.to_string_lossy().as_ref(),
      "-vf",
      EVEN_SIZE_FILTER,
      "-c:v",
      "libx264",
      "-pix_fmt",
      "yuv420p",
      params.output.to_string_lossy().as_ref(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
  }

  fn spawn_error(&self, source: std::io::Error) -> TranscodeError {
    TranscodeError::Spawn {
      program: self.program.clone(),
      source,
    }
  }
}

impl Transcoder for FfmpegTranscoder {
  type Handle = FfmpegPushHandle;

  fn open(&self, params: &PushParams) -> Result<Self::Handle, TranscodeError> {
    let args = Self::push_args(params);
    info!("启动推流: {} {}", self.program, args.join(" "));

    let mut child = Command::new(&self.program)
      .args(&args)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(|e| self.spawn_error(e))?;
    let stdin = child.stdin.take().ok_or(TranscodeError::StdinUnavailable)?;

    Ok(FfmpegPushHandle {
      child,
      stdin: Some(stdin),
    })
  }

  fn assemble(&self, params: &AssembleParams) -> Result<(), TranscodeError> {
    let args = Self::assemble_args(params);
    info!("拼接视频: {} {}", self.program, args.join(" "));

    let output = Command::new(&self.program)
      .args(&args)
      .output()
      .map_err(|e| self.spawn_error(e))?;

    if output.status.success() {
      info!("视频拼接完成: {}", params.output.display());
      Ok(())
    } else {
      let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
      error!("ffmpeg 错误: {}", stderr);
      Err(TranscodeError::Exit {
        status: output.status.to_string(),
        stderr,
      })
    }
  }
}

pub struct FfmpegPushHandle {
  child: Child,
  stdin: Option<ChildStdin>,
}

impl PushHandle for FfmpegPushHandle {
  fn write_frame(&mut self, data: &[u8]) -> WriteStatus {
    let Some(stdin) = self.stdin.as_mut() else {
      return WriteStatus::Failed(std::io::Error::from(ErrorKind::BrokenPipe));
    };

    let mut written = 0;
    while written < data.len() {
      match stdin.write(&data[written..]) {
        Ok(0) => {
          return WriteStatus::Partial {
            written,
            expected: data.len(),
          };
        }
        Ok(n) => written += n,
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => return WriteStatus::Failed(e),
      }
    }

    match stdin.flush() {
      Ok(()) => WriteStatus::Complete,
      Err(e) => WriteStatus::Failed(e),
    }
  }

  fn close(mut self) -> Result<(), TranscodeError> {
    // 关闭标准输入让 ffmpeg 收尾
    drop(self.stdin.take());
    let status = self.child.wait()?;
    debug!("推流进程退出: {}", status);
    if status.success() {
      Ok(())
    } else {
      Err(TranscodeError::Exit {
        status: status.to_string(),
        stderr: String::new(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn muxer_follows_destination_scheme() {
    assert_eq!(push_muxer("rtmp://live.example/app/key"), "flv");
    assert_eq!(push_muxer("rtsp://127.0.0.1:8554/out"), "rtsp");
    assert_eq!(push_muxer("udp://239.0.0.1:1234"), "mpegts");
    assert_eq!(push_muxer("srt://host:9000"), "mpegts");
    assert_eq!(push_muxer("not a url"), "flv");
  }

  #[test]
  fn push_command_reads_raw_rgb_from_stdin() {
    let args = FfmpegTranscoder::push_args(&PushParams {
      target: "rtmp://host/live".to_string(),
      width: 640,
      height: 480,
      fps: 25.0,
    });
    let line = args.join(" ");
    assert!(line.contains("-f rawvideo -pix_fmt rgb24 -s 640x480 -r 25.00 -i -"));
    assert!(line.ends_with("-f flv rtmp://host/live"));
  }

  #[test]
  fn odd_push_size_is_padded_to_even() {
    let args = FfmpegTranscoder::push_args(&PushParams {
      target: "rtsp://host/live".to_string(),
      width: 641,
      height: 359,
      fps: 25.0,
    });
    let line = args.join(" ");
    assert!(line.contains("-s 641x359"));
    assert!(line.contains("-vf pad=ceil(iw/2)*2:ceil(ih/2)*2 -c:v libx264"));
  }

  #[test]
  fn assemble_command_uses_sequence_pattern() {
    let args = FfmpegTranscoder::assemble_args(&AssembleParams {
      pattern: PathBuf::from("/out/buffer_tmp_1_2/buf_%08d.png"),
      fps: 25.0,
      output: PathBuf::from("/out/site.mp4"),
    });
    assert_eq!(
      args.join(" "),
      "-y -loglevel error -framerate 25.000000 -i /out/buffer_tmp_1_2/buf_%08d.png \
       -vf pad=ceil(iw/2)*2:ceil(ih/2)*2 -c:v libx264 -pix_fmt yuv420p /out/site.mp4"
    );
  }

  #[test]
  fn missing_program_fails_to_spawn() {
    let transcoder = FfmpegTranscoder::new("/nonexistent/shanan-ffmpeg");
    let err = transcoder
      .open(&PushParams {
        target: "rtmp://host/live".to_string(),
        width: 2,
        height: 2,
        fps: 25.0,
      })
      .err()
      .unwrap();
    assert!(matches!(err, TranscodeError::Spawn { .. }));
  }
}
