// 该文件是 Shanan （山南西风） 项目的一部分。
// src/error.rs - 运行错误与退出码
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

use thiserror::Error;

use crate::{frame::TensorError, input::InputError};

pub const EXIT_NO_USABLE_INPUT: u8 = 2;
pub const EXIT_ENGINE_CONTEXT: u8 = 3;
pub const EXIT_BUFFER_ALLOCATION: u8 = 4;
pub const EXIT_INVALID_INPUT: u8 = 5;

/// 启动阶段的致命错误，每一类对应一个独立的退出码
#[derive(Error, Debug)]
pub enum RunError {
  #[error("没有可用的输入: {0}")]
  NoUsableInput(String),
  #[error("推理上下文创建失败: {0}")]
  EngineContext(String),
  #[error("缓冲区分配失败: {0}")]
  BufferAllocation(#[from] TensorError),
  #[error("输入路径无效: {0}")]
  InvalidInput(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

impl From<InputError> for RunError {
  fn from(err: InputError) -> Self {
    match err {
      InputError::NoFrames(_) => RunError::NoUsableInput(err.to_string()),
      other => RunError::InvalidInput(other.to_string()),
    }
  }
}

impl RunError {
  pub fn exit_code(&self) -> u8 {
    match self {
      RunError::NoUsableInput(_) => EXIT_NO_USABLE_INPUT,
      RunError::EngineContext(_) => EXIT_ENGINE_CONTEXT,
      RunError::BufferAllocation(_) => EXIT_BUFFER_ALLOCATION,
      RunError::InvalidInput(_) | RunError::IoError(_) => EXIT_INVALID_INPUT,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exit_codes_are_distinct() {
    let codes = [
      RunError::NoUsableInput("x".into()).exit_code(),
      RunError::EngineContext("x".into()).exit_code(),
      RunError::BufferAllocation(TensorError::Allocation { elements: 1 }).exit_code(),
      RunError::InvalidInput("x".into()).exit_code(),
    ];
    for (i, a) in codes.iter().enumerate() {
      assert_ne!(*a, 0);
      for b in &codes[i + 1..] {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn empty_directory_maps_to_no_usable_input() {
    let err: RunError = InputError::NoFrames("/tmp/empty".into()).into();
    assert_eq!(err.exit_code(), EXIT_NO_USABLE_INPUT);
    let err: RunError = InputError::NotFound("/nope".into()).into();
    assert_eq!(err.exit_code(), EXIT_INVALID_INPUT);
  }
}
