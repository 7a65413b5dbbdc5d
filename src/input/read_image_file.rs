// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use tracing::{debug, info};

use crate::{
  frame::Frame,
  input::{FrameSource, InputError, InputKind, is_image_file},
};

pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 图像序列输入
///
/// 目录按文件名排序；时间戳为 `index / max(1, 假定帧率)`。
/// 读不出的文件产出 `Err`，但同样占用一个帧号。
pub struct ImageSequenceInput {
  files: Vec<PathBuf>,
  next: usize,
  assumed_fps: f64,
  current: Option<String>,
}

impl ImageSequenceInput {
  pub fn from_path(path: impl AsRef<Path>, assumed_fps: f64) -> Result<Self, InputError> {
    let path = path.as_ref();
    let files = if path.is_dir() {
      let mut files = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let p = entry.path();
        if p.is_file() && is_image_file(&p) {
          files.push(p);
        }
      }
      files.sort();
      files
    } else {
      vec![path.to_path_buf()]
    };

    if files.is_empty() {
      return Err(InputError::NoFrames(path.display().to_string()));
    }
    info!("共 {} 张图像，假定帧率 {:.2}", files.len(), assumed_fps);

    Ok(Self {
      files,
      next: 0,
      assumed_fps,
      current: None,
    })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  fn timestamp(&self, index: usize) -> f64 {
    index as f64 / self.assumed_fps.max(1.0)
  }
}

impl Iterator for ImageSequenceInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let index = self.next;
    let path = self.files.get(index)?.clone();
    self.next += 1;
    self.current = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned());

    debug!("读取图像 {}", path.display());
    let image = ImageReader::open(&path)
      .map_err(InputError::from)
      .and_then(|reader| {
        reader.decode().map_err(|source| InputError::Image {
          path: path.display().to_string(),
          source,
        })
      });

    Some(image.map(|image| Frame::new(image.to_rgb8(), index as u64, self.timestamp(index))))
  }
}

impl FrameSource for ImageSequenceInput {
  fn kind(&self) -> InputKind {
    InputKind::ImageSequence
  }

  fn fps(&self) -> Option<f64> {
    None
  }

  fn current_name(&self) -> Option<&str> {
    self.current.as_deref()
  }
}
