// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 帧与张量缓冲区定义
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

use image::RgbImage;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

/// 输入帧
///
/// 由输入源产生，在交给输出管理器之前由当前迭代独占。
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧序号（从 0 开始）
  pub index: u64,
  /// 时间戳（秒）：视频取源时钟，图像序列按假定帧率合成
  pub timestamp: f64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp: f64) -> Self {
    Self {
      image,
      index,
      timestamp,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 连续的 RGB 像素数据（NHWC）
  pub fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量缓冲区分配失败: {elements} 个元素")]
  Allocation { elements: usize },
  #[error("张量形状溢出: {0:?}")]
  ShapeOverflow(Vec<usize>),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 拥有所有权的 f32 张量缓冲区
///
/// 元素数量由形状决定，分配与释放都在同一个作用域内完成。
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBuffer {
  data: Box<[f32]>,
  dims: Vec<usize>,
}

fn element_count(dims: &[usize]) -> Result<usize, TensorError> {
  dims
    .iter()
    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    .ok_or_else(|| TensorError::ShapeOverflow(dims.to_vec()))
}

impl TensorBuffer {
  /// 按形状分配一个全零缓冲区，分配失败时返回错误而不是中止进程
  pub fn try_with_shape(dims: &[usize]) -> Result<Self, TensorError> {
    let elements = element_count(dims)?;
    let mut data = Vec::new();
    data
      .try_reserve_exact(elements)
      .map_err(|_| TensorError::Allocation { elements })?;
    data.resize(elements, 0.0f32);

    Ok(Self {
      data: data.into_boxed_slice(),
      dims: dims.to_vec(),
    })
  }

  pub fn from_vec(dims: &[usize], data: Vec<f32>) -> Result<Self, TensorError> {
    let expected = element_count(dims)?;
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      dims: dims.to_vec(),
    })
  }

  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn as_mut_slice(&mut self) -> &mut [f32] {
    &mut self.data
  }

  /// 检测头输出布局 (C, L)，支持 (batch, C, L) 与 (C, L) 两种形状
  pub fn channels_and_candidates(&self) -> Option<(usize, usize)> {
    match self.dims.as_slice() {
      [_, c, l] => Some((*c, *l)),
      [c, l] => Some((*c, *l)),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocates_zeroed_buffer_with_shape() {
    let buffer = TensorBuffer::try_with_shape(&[1, 3, 4, 5]).unwrap();
    assert_eq!(buffer.len(), 60);
    assert_eq!(buffer.dims(), &[1, 3, 4, 5]);
    assert!(buffer.as_slice().iter().all(|&v| v == 0.0));
  }

  #[test]
  fn rejects_overflowing_shape() {
    let err = TensorBuffer::try_with_shape(&[usize::MAX, 2]).unwrap_err();
    assert!(matches!(err, TensorError::ShapeOverflow(_)));
  }

  #[test]
  fn rejects_mismatched_data() {
    let err = TensorBuffer::from_vec(&[2, 3], vec![0.0; 5]).unwrap_err();
    assert_eq!(
      err,
      TensorError::LengthMismatch {
        expected: 6,
        actual: 5
      }
    );
  }

  #[test]
  fn reads_batched_and_flat_layouts() {
    let batched = TensorBuffer::try_with_shape(&[1, 6, 10]).unwrap();
    assert_eq!(batched.channels_and_candidates(), Some((6, 10)));

    let flat = TensorBuffer::try_with_shape(&[6, 10]).unwrap();
    assert_eq!(flat.channels_and_candidates(), Some((6, 10)));

    let nchw = TensorBuffer::try_with_shape(&[1, 3, 4, 4]).unwrap();
    assert_eq!(nchw.channels_and_candidates(), None);
  }
}
