// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 按类别的非极大值抑制
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

use crate::model::DetectItem;

pub const NMS_IOU_THRESHOLD: f32 = 0.45;
pub const IOU_EPSILON: f32 = 1e-6;

/// 计算两个边界框的 IoU，分母加上 epsilon 以容忍零面积框
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = inter_w * inter_h;
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  inter / (area_a + area_b - inter + IOU_EPSILON)
}

/// 贪心 NMS，只在同类别之间抑制
///
/// 返回按分数降序排列的保留结果，标签绘制顺序和日志顺序都依赖这个顺序。
pub fn nms(mut detections: Vec<DetectItem>) -> Vec<DetectItem> {
  // 稳定排序，同分时保持解码顺序
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut suppressed = vec![false; detections.len()];
  let mut result = Vec::new();

  for i in 0..detections.len() {
    if suppressed[i] {
      continue;
    }
    let best = &detections[i];
    for j in (i + 1)..detections.len() {
      if suppressed[j] || detections[j].class_id != best.class_id {
        continue;
      }
      if iou(&best.bbox, &detections[j].bbox) > NMS_IOU_THRESHOLD {
        suppressed[j] = true;
      }
    }
    result.push(best.clone());
  }

  result
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: usize, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = [0.0, 0.0, 10.0, 10.0];
    assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_zero_area_boxes_is_finite() {
    let b = [5.0, 5.0, 5.0, 5.0];
    assert_eq!(iou(&b, &b), 0.0);
  }

  #[test]
  fn keeps_highest_of_overlapping_same_class() {
    // 两个 10x10 框水平错开 2.5：交 75，并 125，IoU = 0.6
    let a = item(0, 0.8, [2.5, 0.0, 12.5, 10.0]);
    let b = item(0, 0.9, [0.0, 0.0, 10.0, 10.0]);
    assert!((iou(&a.bbox, &b.bbox) - 0.6).abs() < 1e-4);

    let kept = nms(vec![a, b.clone()]);
    assert_eq!(kept, vec![b]);
  }

  #[test]
  fn different_classes_never_suppress() {
    let a = item(0, 0.9, [0.0, 0.0, 10.0, 10.0]);
    let b = item(1, 0.8, [0.0, 0.0, 10.0, 10.0]);
    let kept = nms(vec![b.clone(), a.clone()]);
    assert_eq!(kept, vec![a, b]);
  }

  #[test]
  fn output_is_score_descending() {
    let kept = nms(vec![
      item(0, 0.3, [0.0, 0.0, 1.0, 1.0]),
      item(1, 0.9, [5.0, 5.0, 6.0, 6.0]),
      item(2, 0.6, [9.0, 9.0, 10.0, 10.0]),
    ]);
    let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.6, 0.3]);
  }

  #[test]
  fn suppressed_box_does_not_suppress_others() {
    // b 被 a 抑制；c 只和 b 重叠，应当保留
    let a = item(0, 0.9, [0.0, 0.0, 10.0, 10.0]);
    let b = item(0, 0.8, [1.0, 0.0, 11.0, 10.0]);
    let c = item(0, 0.7, [8.0, 0.0, 18.0, 10.0]);
    let kept = nms(vec![a.clone(), b, c.clone()]);
    assert_eq!(kept, vec![a, c]);
  }

  #[test]
  fn running_twice_changes_nothing() {
    let input = vec![
      item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
      item(0, 0.85, [1.0, 1.0, 11.0, 11.0]),
      item(0, 0.5, [30.0, 30.0, 40.0, 40.0]),
      item(1, 0.7, [0.0, 0.0, 10.0, 10.0]),
      item(1, 0.65, [0.5, 0.5, 10.5, 10.5]),
      item(2, 0.4, [100.0, 100.0, 100.0, 100.0]),
    ];
    let once = nms(input);
    let twice = nms(once.clone());
    assert_eq!(once, twice);
    assert_eq!(once.len(), 4);
  }
}
