// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/snapshot.rs - 告警截图保存
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

use std::path::{Path, PathBuf};

use chrono::Utc;
use image::RgbImage;
use serde_json::json;
use thiserror::Error;

use crate::{frame::Frame, model::DetectItem, model::labels::ClassNames};

#[derive(Error, Debug)]
pub enum SnapshotError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 告警截图写入器；`record` 为真时在截图旁写一份同名 JSON 检测记录
pub struct SnapshotWriter {
  directory: PathBuf,
  record: bool,
}

impl SnapshotWriter {
  pub fn new(directory: impl Into<PathBuf>, record: bool) -> Self {
    Self {
      directory: directory.into(),
      record,
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn save(
    &self,
    image: &RgbImage,
    file_name: &str,
    frame: &Frame,
    detections: &[DetectItem],
    names: &ClassNames,
  ) -> Result<PathBuf, SnapshotError> {
    let path = self.directory.join(file_name);
    image.save(&path)?;

    if self.record {
      let items: Vec<_> = detections
        .iter()
        .map(|d| {
          json!({
            "class": names.label(d.class_id),
            "class_id": d.class_id,
            "score": d.score,
            "box": d.bbox,
          })
        })
        .collect();
      let record = json!({
        "image": file_name,
        "frame": frame.index + 1,
        "time": frame.timestamp,
        "saved_at": Utc::now().to_rfc3339(),
        "detections": items,
      });
      std::fs::write(
        path.with_extension("json"),
        serde_json::to_string_pretty(&record)?,
      )?;
    }

    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_image_and_detection_record() {
    let nanos = std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .unwrap()
      .as_nanos();
    let dir = std::env::temp_dir().join(format!("shanan_snapshot_{}_{}", std::process::id(), nanos));
    std::fs::create_dir_all(&dir).unwrap();

    let writer = SnapshotWriter::new(&dir, true);
    let frame = Frame::new(RgbImage::new(8, 8), 41, 12.4);
    let names = ClassNames::parse("no_vest\r\nhead\r\n");
    let detections = vec![DetectItem {
      class_id: 1,
      score: 0.5,
      bbox: [1.0, 2.0, 3.0, 4.0],
    }];

    let path = writer
      .save(&frame.image, "alarm_t000012_f000042.png", &frame, &detections, &names)
      .unwrap();
    assert!(path.exists());

    let text = std::fs::read_to_string(path.with_extension("json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["frame"], 42);
    assert_eq!(value["detections"][0]["class"], "head");
    assert_eq!(value["detections"][0]["box"][3], 4.0);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn missing_directory_is_an_error() {
    let writer = SnapshotWriter::new("/nonexistent/shanan/alarms", false);
    let frame = Frame::new(RgbImage::new(2, 2), 0, 0.0);
    let result = writer.save(&frame.image, "a.png", &frame, &[], &ClassNames::default());
    assert!(result.is_err());
  }
}
