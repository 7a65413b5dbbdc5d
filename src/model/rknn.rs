// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rknn.rs - RKNN 推理引擎
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  frame::{TensorBuffer, TensorError},
  model::{BOX_CHANNELS, Model, head_layout},
};

const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_OUTPUT_INDEX: usize = 0;

#[derive(Error, Debug)]
pub enum RknnEngineError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("输出张量错误: {0}")]
  OutputError(#[from] TensorError),
  #[error("输出布局与类别数不符: {0}")]
  LayoutMismatch(String),
}

impl RknnEngineError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnEngineError::ModelInvalid(msg.to_string(), e)
  }
}

/// 基于 RKNN 运行时的推理引擎
///
/// 输入为 NCHW f32，输出取第一个张量并按 (C, L) 解释，C = 4 + 类别数。
/// 加载时用一次全零输入试运行，确认输出长度与类别数一致。
pub struct RknnEngine {
  context: Context,
  channels: usize,
  candidates: usize,
}

impl RknnEngine {
  /// `input_shape` 为 NCHW 输入形状
  pub fn load(
    model_path: impl AsRef<Path>,
    num_classes: usize,
    input_shape: &[usize; 4],
  ) -> Result<Self, RknnEngineError> {
    let model_path = model_path.as_ref();
    info!("加载模型文件: {}", model_path.display());
    let model_data = std::fs::read(model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnEngineError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnEngineError::invalid("无法获取输出数量", e))?;
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs != RKNN_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      );
      return Err(RknnEngineError::invalid(
        &format!(
          "预期模型输入数量为 {}, 实际为 {}",
          RKNN_NUM_INPUTS, num_inputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    let probe = TensorBuffer::try_with_shape(input_shape)?;
    let len = run_raw(&context, &probe)?.len();
    let (channels, candidates) = head_layout(len, num_classes).ok_or_else(|| {
      RknnEngineError::LayoutMismatch(format!(
        "输出长度 {} 无法按 {} 个类别（{} 通道）划分",
        len,
        num_classes,
        BOX_CHANNELS + num_classes
      ))
    })?;
    info!(
      "模型加载完成，输出布局 {} 通道 × {} 候选",
      channels, candidates
    );

    Ok(Self {
      context,
      channels,
      candidates,
    })
  }
}

fn run_raw(context: &Context, input: &TensorBuffer) -> Result<Vec<f32>, RknnEngineError> {
  let bytes: Vec<u8> = input
    .as_slice()
    .iter()
    .flat_map(|v| v.to_ne_bytes())
    .collect();

  debug!("设置模型输入");
  context.set_input(0, &bytes, TensorFormat::NCHW, TensorType::Float32)?;

  debug!("执行模型推理");
  context.run()?;

  debug!("获取模型输出");
  let output = context.get_outputs()?;
  Ok(output.get_f32(RKNN_OUTPUT_INDEX)?.to_vec())
}

impl Model for RknnEngine {
  type Error = RknnEngineError;

  fn infer(&self, input: &TensorBuffer) -> Result<TensorBuffer, Self::Error> {
    let data = run_raw(&self.context, input)?;
    Ok(TensorBuffer::from_vec(
      &[self.channels, self.candidates],
      data,
    )?)
  }
}
