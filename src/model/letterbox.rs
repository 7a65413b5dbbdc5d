// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/letterbox.rs - 等比缩放填充变换
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

use image::{RgbImage, imageops::FilterType};

use crate::frame::{TensorBuffer, TensorError};

/// 填充边界使用的中灰色
pub const LETTERBOX_FILL: u8 = 114;

/// 每帧重新计算的缩放/填充参数
///
/// 满足 `model_w == new_w + pad_left + pad_right`，高度方向同理。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
  pub scale: f32,
  pub new_w: u32,
  pub new_h: u32,
  pub pad_left: u32,
  pub pad_top: u32,
  pub pad_right: u32,
  pub pad_bottom: u32,
  pub orig_w: u32,
  pub orig_h: u32,
  pub model_w: u32,
  pub model_h: u32,
}

impl LetterboxParams {
  /// 调用方需保证原始宽高非零
  pub fn compute(orig_w: u32, orig_h: u32, model_w: u32, model_h: u32) -> Self {
    let scale = (model_w as f32 / orig_w as f32).min(model_h as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).min(model_w);
    let new_h = ((orig_h as f32 * scale).round() as u32).min(model_h);
    let pad_left = (model_w - new_w) / 2;
    let pad_top = (model_h - new_h) / 2;

    Self {
      scale,
      new_w,
      new_h,
      pad_left,
      pad_top,
      pad_right: model_w - new_w - pad_left,
      pad_bottom: model_h - new_h - pad_top,
      orig_w,
      orig_h,
      model_w,
      model_h,
    }
  }

  /// 模型空间的中心点格式框 (cx, cy, w, h) 映射回原始帧的角点坐标
  pub fn unmap_box(&self, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    let pad_x = self.pad_left as f32;
    let pad_y = self.pad_top as f32;
    [
      (cx - w / 2.0 - pad_x) / self.scale,
      (cy - h / 2.0 - pad_y) / self.scale,
      (cx + w / 2.0 - pad_x) / self.scale,
      (cy + h / 2.0 - pad_y) / self.scale,
    ]
  }

  /// 原始帧角点坐标映射到模型空间的中心点格式 (cx, cy, w, h)
  pub fn map_box(&self, bbox: &[f32; 4]) -> [f32; 4] {
    let x1 = bbox[0] * self.scale + self.pad_left as f32;
    let y1 = bbox[1] * self.scale + self.pad_top as f32;
    let x2 = bbox[2] * self.scale + self.pad_left as f32;
    let y2 = bbox[3] * self.scale + self.pad_top as f32;
    [(x1 + x2) / 2.0, (y1 + y2) / 2.0, x2 - x1, y2 - y1]
  }

  pub fn input_shape(&self) -> [usize; 4] {
    [1, 3, self.model_h as usize, self.model_w as usize]
  }
}

/// 缩放、填充并归一化到 [0, 1]，以 NCHW 写入 `tensor`
pub fn letterbox_into(
  image: &RgbImage,
  params: &LetterboxParams,
  tensor: &mut TensorBuffer,
) -> Result<(), TensorError> {
  let width = params.model_w as usize;
  let height = params.model_h as usize;
  let plane = width * height;
  if tensor.len() != plane * 3 {
    return Err(TensorError::LengthMismatch {
      expected: plane * 3,
      actual: tensor.len(),
    });
  }

  let resized = image::imageops::resize(
    image,
    params.new_w.max(1),
    params.new_h.max(1),
    FilterType::Triangle,
  );

  let fill = LETTERBOX_FILL as f32 / 255.0;
  let data = tensor.as_mut_slice();
  data.fill(fill);

  let (left, top) = (params.pad_left as usize, params.pad_top as usize);
  for (x, y, pixel) in resized.enumerate_pixels() {
    let (x, y) = (x as usize + left, y as usize + top);
    if x >= width || y >= height {
      continue;
    }
    let idx = y * width + x;
    for c in 0..3 {
      data[c * plane + idx] = pixel[c] as f32 / 255.0;
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn assert_invariant(p: &LetterboxParams) {
    assert_eq!(p.model_w, p.new_w + p.pad_left + p.pad_right);
    assert_eq!(p.model_h, p.new_h + p.pad_top + p.pad_bottom);
  }

  #[test]
  fn landscape_frame_is_padded_vertically() {
    let p = LetterboxParams::compute(640, 480, 416, 416);
    assert!((p.scale - 0.65).abs() < 1e-6);
    assert_eq!((p.new_w, p.new_h), (416, 312));
    assert_eq!((p.pad_left, p.pad_top), (0, 52));
    assert_invariant(&p);
  }

  #[test]
  fn odd_padding_puts_extra_pixel_on_far_side() {
    let p = LetterboxParams::compute(100, 33, 64, 64);
    assert_eq!(p.new_w, 64);
    assert_eq!(p.new_h, 21);
    assert_eq!(p.pad_top, 21);
    assert_eq!(p.pad_bottom, 22);
    assert_invariant(&p);
  }

  #[test]
  fn inverse_recovers_forward_mapping() {
    let sizes = [
      (640, 480),
      (480, 640),
      (1920, 1080),
      (333, 777),
      (416, 416),
      (17, 1000),
    ];
    let models = [(416, 416), (640, 640), (640, 384)];
    let bbox = [10.5f32, 7.25, 15.0, 16.0];

    for &(w, h) in &sizes {
      for &(mw, mh) in &models {
        let p = LetterboxParams::compute(w, h, mw, mh);
        assert_invariant(&p);
        let [cx, cy, bw, bh] = p.map_box(&bbox);
        let back = p.unmap_box(cx, cy, bw, bh);
        for (a, b) in bbox.iter().zip(back.iter()) {
          assert!((a - b).abs() < 1e-2, "{w}x{h} -> {mw}x{mh}: {a} vs {b}");
        }
      }
    }
  }

  #[test]
  fn fills_border_with_gray_and_normalizes_content() {
    let image = RgbImage::from_pixel(8, 4, Rgb([255, 0, 51]));
    let p = LetterboxParams::compute(8, 4, 8, 8);
    assert_eq!((p.pad_top, p.pad_bottom), (2, 2));

    let mut tensor = TensorBuffer::try_with_shape(&p.input_shape()).unwrap();
    letterbox_into(&image, &p, &mut tensor).unwrap();

    let data = tensor.as_slice();
    let plane = 64;
    let gray = LETTERBOX_FILL as f32 / 255.0;
    // 第 0 行是填充
    assert!((data[0] - gray).abs() < 1e-6);
    assert!((data[plane] - gray).abs() < 1e-6);
    // 第 3 行落在内容区域
    let idx = 3 * 8 + 4;
    assert!((data[idx] - 1.0).abs() < 1e-6);
    assert!(data[plane + idx].abs() < 1e-6);
    assert!((data[2 * plane + idx] - 0.2).abs() < 1e-6);
  }

  #[test]
  fn rejects_wrong_tensor_size() {
    let image = RgbImage::new(4, 4);
    let p = LetterboxParams::compute(4, 4, 8, 8);
    let mut tensor = TensorBuffer::try_with_shape(&[1, 3, 4, 4]).unwrap();
    assert!(letterbox_into(&image, &p, &mut tensor).is_err());
  }
}
