// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decoder.rs - 检测头输出解码
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

use tracing::debug;

use crate::{
  frame::TensorBuffer,
  model::{BOX_CHANNELS, DetectItem, letterbox::LetterboxParams},
};

pub const DEFAULT_CONFIDENCE: f32 = 0.25;

const PROBABILITY_LOW: f32 = -0.5;
const PROBABILITY_HIGH: f32 = 1.5;

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 置信度归一化
///
/// 原始分数落在 [-0.5, 1.5] 之外时视为 logit 并做 sigmoid，否则视为已经是概率。
/// 这是根据数值范围推断的经验规则，不保证对所有导出配置都正确。
pub fn normalize_score(raw: f32) -> f32 {
  if !(PROBABILITY_LOW..=PROBABILITY_HIGH).contains(&raw) {
    sigmoid(raw)
  } else {
    raw
  }
}

/// 检测头解码器，布局为 C 通道 × L 候选
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
  confidence: f32,
}

impl Default for Decoder {
  fn default() -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE,
    }
  }
}

impl Decoder {
  pub fn new(confidence: f32) -> Self {
    Self { confidence }
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn decode(&self, output: &TensorBuffer, params: &LetterboxParams) -> Vec<DetectItem> {
    match output.channels_and_candidates() {
      Some((channels, candidates)) if channels * candidates <= output.len() => {
        self.decode_raw(&output.as_slice()[..channels * candidates], candidates, params)
      }
      _ => {
        debug!("无法识别的输出张量形状: {:?}", output.dims());
        Vec::new()
      }
    }
  }

  /// `data` 为扁平的 C × L 数据，C 由长度推出
  pub fn decode_raw(
    &self,
    data: &[f32],
    candidates: usize,
    params: &LetterboxParams,
  ) -> Vec<DetectItem> {
    if candidates == 0 || data.len() % candidates != 0 {
      debug!("输出长度 {} 与候选数 {} 不匹配", data.len(), candidates);
      return Vec::new();
    }
    let channels = data.len() / candidates;
    if channels <= BOX_CHANNELS {
      debug!("输出通道数 {} 不足以包含类别分数", channels);
      return Vec::new();
    }

    let num_classes = channels - BOX_CHANNELS;
    let at = |c: usize, i: usize| data[c * candidates + i];
    let mut items = Vec::new();

    for i in 0..candidates {
      // NaN 分数永远不会胜出，全部为 NaN 时得分为 0
      let (mut best_class, mut best_raw) = (0usize, f32::NEG_INFINITY);
      for c in 0..num_classes {
        let raw = at(BOX_CHANNELS + c, i);
        if raw > best_raw {
          best_raw = raw;
          best_class = c;
        }
      }

      let score = normalize_score(best_raw);
      if score < self.confidence {
        continue;
      }

      let bbox = params.unmap_box(at(0, i), at(1, i), at(2, i), at(3, i));
      items.push(DetectItem {
        class_id: best_class,
        score,
        bbox,
      });
    }

    debug!("解码得到 {} 个候选框", items.len());
    items
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity_params(size: u32) -> LetterboxParams {
    LetterboxParams::compute(size, size, size, size)
  }

  /// 按 (cx, cy, w, h, scores...) 的候选列表构造 C × L 数据
  fn tensor(candidates: &[Vec<f32>]) -> Vec<f32> {
    let channels = candidates[0].len();
    let l = candidates.len();
    let mut data = vec![0.0; channels * l];
    for (i, cand) in candidates.iter().enumerate() {
      for (c, v) in cand.iter().enumerate() {
        data[c * l + i] = *v;
      }
    }
    data
  }

  #[test]
  fn logit_scores_are_squashed() {
    let expected = 1.0 / (1.0 + (-2.0f32).exp());
    assert!((normalize_score(2.0) - expected).abs() < 1e-6);
    assert!((normalize_score(-3.0) - sigmoid(-3.0)).abs() < 1e-6);
  }

  #[test]
  fn probability_scores_pass_through() {
    assert_eq!(normalize_score(0.6), 0.6);
    assert_eq!(normalize_score(1.5), 1.5);
    assert_eq!(normalize_score(-0.5), -0.5);
  }

  #[test]
  fn picks_first_maximum_class() {
    let data = tensor(&[vec![50.0, 50.0, 10.0, 10.0, 0.7, 0.9, 0.9]]);
    let items = Decoder::default().decode_raw(&data, 1, &identity_params(100));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
    assert!((items[0].score - 0.9).abs() < 1e-6);
    assert_eq!(items[0].bbox, [45.0, 45.0, 55.0, 55.0]);
  }

  #[test]
  fn drops_candidates_below_threshold() {
    let data = tensor(&[
      vec![10.0, 10.0, 4.0, 4.0, 0.2, 0.1],
      vec![20.0, 20.0, 4.0, 4.0, 0.1, 0.3],
    ]);
    let items = Decoder::new(0.25).decode_raw(&data, 2, &identity_params(64));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
  }

  #[test]
  fn maps_boxes_back_through_letterbox() {
    // 640x480 -> 416x416: scale 0.65, pad_top 52
    let params = LetterboxParams::compute(640, 480, 416, 416);
    let data = tensor(&[vec![208.0, 208.0, 65.0, 130.0, 0.95]]);
    let items = Decoder::default().decode_raw(&data, 1, &params);
    let [x1, y1, x2, y2] = items[0].bbox;
    assert!((x1 - 270.0).abs() < 1e-3);
    assert!((x2 - 370.0).abs() < 1e-3);
    assert!((y1 - 140.0).abs() < 1e-3);
    assert!((y2 - 340.0).abs() < 1e-3);
  }

  #[test]
  fn reads_batched_tensor() {
    let data = tensor(&[
      vec![10.0, 10.0, 4.0, 4.0, 3.0, -2.0],
      vec![20.0, 20.0, 4.0, 4.0, 0.1, 0.2],
    ]);
    let output = TensorBuffer::from_vec(&[1, 6, 2], data).unwrap();
    let items = Decoder::default().decode(&output, &identity_params(64));
    assert_eq!(items.len(), 1);
    assert!((items[0].score - sigmoid(3.0)).abs() < 1e-6);
  }

  #[test]
  fn nan_scores_never_win() {
    let data = tensor(&[
      vec![10.0, 10.0, 4.0, 4.0, f32::NAN, 0.9],
      vec![20.0, 20.0, 4.0, 4.0, f32::NAN, f32::NAN],
    ]);
    let items = Decoder::default().decode_raw(&data, 2, &identity_params(64));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
    assert!((items[0].score - 0.9).abs() < 1e-6);
  }

  #[test]
  fn box_only_tensor_yields_nothing() {
    let output = TensorBuffer::from_vec(&[4, 2], vec![1.0; 8]).unwrap();
    assert!(Decoder::default().decode(&output, &identity_params(64)).is_empty());
  }
}
