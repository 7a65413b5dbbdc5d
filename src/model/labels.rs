// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/labels.rs - 类别名称文件
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

use std::{borrow::Cow, path::Path};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("读取类别文件失败 {path}: {source}")]
  IoError {
    path: String,
    source: std::io::Error,
  },
}

/// 类别名称表
///
/// 每个非空行去掉最后一个字符后作为类别名。这一步是为 CRLF 结尾的文件准备的，
/// 对 LF 结尾的文件会吃掉名称的最后一个真实字符（例如 `no_vest` 变成 `no_ves`）。
/// 在确认名称文件的换行约定之前保持这个行为不变。
#[derive(Debug, Clone, Default)]
pub struct ClassNames {
  names: Vec<String>,
}

impl ClassNames {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| LabelError::IoError {
      path: path.display().to_string(),
      source,
    })?;
    let names = Self::parse(&text);
    debug!("从 {} 读取 {} 个类别", path.display(), names.len());
    Ok(names)
  }

  pub fn parse(text: &str) -> Self {
    // 只按 '\n' 切分，保留 '\r'
    let names: Vec<String> = text
      .split('\n')
      .filter(|line| !line.is_empty())
      .map(|line| {
        let mut chars = line.chars();
        chars.next_back();
        chars.as_str().to_string()
      })
      .collect();

    if names.iter().any(|n| n.is_empty()) {
      warn!("类别文件中存在去尾后为空的类别名");
    }

    Self { names }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  /// 未知类别回退为数字编号
  pub fn label(&self, class_id: usize) -> Cow<'_, str> {
    match self.names.get(class_id) {
      Some(name) => Cow::Borrowed(name.as_str()),
      None => Cow::Owned(class_id.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lf_terminated_names_lose_their_last_character() {
    let names = ClassNames::parse("no_vest\nhead\n");
    assert_eq!(names.names(), &["no_ves".to_string(), "hea".to_string()]);
  }

  #[test]
  fn crlf_terminated_names_are_intact() {
    let names = ClassNames::parse("no_vest\r\nhead\r\n");
    assert_eq!(names.names(), &["no_vest".to_string(), "head".to_string()]);
  }

  #[test]
  fn empty_lines_are_skipped() {
    let names = ClassNames::parse("\nvest\n\n\nhelmet");
    assert_eq!(names.names(), &["ves".to_string(), "helme".to_string()]);
  }

  #[test]
  fn unknown_class_falls_back_to_id() {
    let names = ClassNames::parse("person\r\n");
    assert_eq!(names.label(0), "person");
    assert_eq!(names.label(7), "7");
  }
}
