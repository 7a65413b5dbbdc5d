// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use crate::frame::TensorBuffer;

/// 张量推理引擎
///
/// 输入为预处理后的 NCHW f32 缓冲区，输出为原始检测头张量
/// （形状 (batch, C, L) 或 (C, L)，C = 4 + 类别数）。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &TensorBuffer) -> Result<TensorBuffer, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: usize,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原始帧像素坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

/// 检测头中的框参数通道数
pub const BOX_CHANNELS: usize = 4;

/// 由扁平输出长度与类别数推出 (C, L) 布局；类别数为零或长度不能整除时返回 `None`
pub fn head_layout(len: usize, num_classes: usize) -> Option<(usize, usize)> {
  let channels = BOX_CHANNELS + num_classes;
  if num_classes == 0 || len == 0 || len % channels != 0 {
    return None;
  }
  Some((channels, len / channels))
}

pub mod decoder;
pub mod labels;
pub mod letterbox;
pub mod nms;

#[cfg(feature = "rknpu_engine")]
mod rknn;
#[cfg(feature = "rknpu_engine")]
pub use self::rknn::{RknnEngine, RknnEngineError};

pub use self::decoder::{DEFAULT_CONFIDENCE, Decoder, normalize_score};
pub use self::labels::{ClassNames, LabelError};
pub use self::letterbox::{LETTERBOX_FILL, LetterboxParams, letterbox_into};
pub use self::nms::{IOU_EPSILON, NMS_IOU_THRESHOLD, iou, nms};
