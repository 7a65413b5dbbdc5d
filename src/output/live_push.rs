// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/live_push.rs - 实时推流
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

use tracing::{info, warn};

use crate::output::{
  SinkFrame,
  transcoder::{PushHandle, PushParams, Transcoder, WriteStatus},
};

/// 没有强制帧率且源帧率不可用时的推流帧率
pub const LIVE_PUSH_DEFAULT_FPS: f64 = 25.0;

pub fn resolve_push_fps(forced: Option<f64>, source: Option<f64>) -> f64 {
  forced
    .filter(|&f| f > 0.0)
    .or(source.filter(|&f| f > 1.0))
    .unwrap_or(LIVE_PUSH_DEFAULT_FPS)
}

enum PushState<H> {
  Pending,
  Open(H),
  Disabled,
}

/// 实时推流输出
///
/// 第一帧到达时启动转码进程，此后每帧写入原始 RGB 数据。
/// 写入不完整只记录警告；管道断开或进程启动失败则本次运行不再推流。
pub struct LivePushSink<H> {
  target: String,
  forced_fps: Option<f64>,
  state: PushState<H>,
  frames: u64,
  partial_writes: u64,
}

impl<H: PushHandle> LivePushSink<H> {
  pub fn new(target: impl Into<String>, forced_fps: Option<f64>) -> Self {
    Self {
      target: target.into(),
      forced_fps,
      state: PushState::Pending,
      frames: 0,
      partial_writes: 0,
    }
  }

  pub fn is_disabled(&self) -> bool {
    matches!(self.state, PushState::Disabled)
  }

  pub fn partial_writes(&self) -> u64 {
    self.partial_writes
  }

  pub fn write<T: Transcoder<Handle = H>>(&mut self, transcoder: &T, frame: &SinkFrame) {
    if matches!(self.state, PushState::Pending) {
      let params = PushParams {
        target: self.target.clone(),
        width: frame.image.width(),
        height: frame.image.height(),
        fps: resolve_push_fps(self.forced_fps, frame.source_fps),
      };
      self.state = match transcoder.open(&params) {
        Ok(handle) => {
          info!(
            "推流已启动: {} ({}x{} @ {:.2} fps)",
            params.target, params.width, params.height, params.fps
          );
          PushState::Open(handle)
        }
        Err(e) => {
          warn!("启动推流进程失败，本次运行不再推流: {}", e);
          PushState::Disabled
        }
      };
    }

    let PushState::Open(handle) = &mut self.state else {
      return;
    };

    match handle.write_frame(frame.image.as_raw()) {
      WriteStatus::Complete => self.frames += 1,
      WriteStatus::Partial { written, expected } => {
        warn!(
          "推流写入不完整: 帧 {} 写入 {}/{} 字节",
          frame.index, written, expected
        );
        self.partial_writes += 1;
      }
      WriteStatus::Failed(e) => {
        warn!("推流管道已断开，停止推流: {}", e);
        if let PushState::Open(handle) = std::mem::replace(&mut self.state, PushState::Disabled)
          && let Err(e) = handle.close()
        {
          warn!("关闭推流进程失败: {}", e);
        }
      }
    }
  }

  pub fn finish(self) -> u64 {
    if let PushState::Open(handle) = self.state {
      match handle.close() {
        Ok(()) => info!("推流结束，共推送 {} 帧", self.frames),
        Err(e) => warn!("关闭推流进程失败: {}", e),
      }
    }
    self.frames
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn push_rate_follows_forced_then_source_then_default() {
    assert_eq!(resolve_push_fps(Some(10.0), Some(30.0)), 10.0);
    assert_eq!(resolve_push_fps(None, Some(30.0)), 30.0);
    assert_eq!(resolve_push_fps(None, Some(0.9)), LIVE_PUSH_DEFAULT_FPS);
    assert_eq!(resolve_push_fps(None, None), LIVE_PUSH_DEFAULT_FPS);
  }
}
