// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/disk_buffer.rs - 磁盘帧缓冲与事后拼接
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

//! 磁盘缓冲输出
//!
//! 限时采集网络流且没有强制帧率时，无法事先知道真实帧率。
//! 每帧先以编号连续的 PNG 写入私有临时目录，结束后按
//! `帧数 / 配置的采集时长` 计算帧率，再调用转码进程拼接成视频。

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::output::{
  SinkFrame,
  transcoder::{AssembleParams, Transcoder},
};

pub const BUFFER_FILE_PREFIX: &str = "buf_";
pub const BUFFER_DIR_PREFIX: &str = "buffer_tmp_";
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;
const MIN_ASSEMBLY_FPS: f64 = 1.0;
const MIN_DURATION: f64 = 1e-6;

pub fn buffer_file_name(slot: u64) -> String {
  format!("{}{:08}.png", BUFFER_FILE_PREFIX, slot)
}

/// 拼接帧率 `max(1, count / duration)`，时长下限 1e-6 秒
pub fn assembly_rate(count: u64, duration: f64) -> f64 {
  (count as f64 / duration.max(MIN_DURATION)).max(MIN_ASSEMBLY_FPS)
}

/// RAII 守卫确保临时目录总是被删除
struct CleanupGuard {
  path: PathBuf,
}

impl CleanupGuard {
  fn create(root: &Path) -> std::io::Result<Self> {
    let nanos = Utc::now()
      .timestamp_nanos_opt()
      .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
    let path = root.join(format!(
      "{}{}_{}",
      BUFFER_DIR_PREFIX,
      nanos,
      std::process::id()
    ));
    std::fs::create_dir_all(&path)?;
    Ok(Self { path })
  }
}

impl Drop for CleanupGuard {
  fn drop(&mut self) {
    match std::fs::remove_dir_all(&self.path) {
      Ok(()) => debug!("已删除缓冲目录 {}", self.path.display()),
      Err(e) => warn!("清理缓冲目录失败 {}: {}", self.path.display(), e),
    }
  }
}

/// 磁盘缓冲输出
pub struct DiskBufferSink {
  output: PathBuf,
  duration: f64,
  scratch: Option<CleanupGuard>,
  files: Vec<PathBuf>,
  capacity: usize,
  capacity_warned: bool,
}

impl DiskBufferSink {
  /// 临时目录创建失败时返回一个禁用的输出，只记录警告
  pub fn new(
    output: impl Into<PathBuf>,
    duration: f64,
    scratch_root: &Path,
    capacity: usize,
  ) -> Self {
    let scratch = match CleanupGuard::create(scratch_root) {
      Ok(guard) => {
        info!("帧缓冲目录: {}", guard.path.display());
        Some(guard)
      }
      Err(e) => {
        warn!(
          "无法创建缓冲目录 {}: {}，不再输出视频",
          scratch_root.display(),
          e
        );
        None
      }
    };

    Self {
      output: output.into(),
      duration,
      scratch,
      files: Vec::with_capacity(capacity),
      capacity,
      capacity_warned: false,
    }
  }

  pub fn is_disabled(&self) -> bool {
    self.scratch.is_none()
  }

  pub fn scratch_dir(&self) -> Option<&Path> {
    self.scratch.as_ref().map(|g| g.path.as_path())
  }

  pub fn count(&self) -> u64 {
    self.files.len() as u64
  }

  /// 写入失败的帧不占用编号，保证文件序列连续
  pub fn write(&mut self, frame: &SinkFrame) {
    let Some(scratch) = &self.scratch else {
      return;
    };

    let path = scratch.path.join(buffer_file_name(self.count()));
    if let Err(e) = frame.image.save(&path) {
      error!("写入缓冲帧失败 {}: {}", path.display(), e);
      return;
    }
    self.files.push(path);

    if self.files.len() > self.capacity && !self.capacity_warned {
      warn!(
        "缓冲帧数超过容量提示 {}，继续写入磁盘",
        self.capacity
      );
      self.capacity_warned = true;
    }
  }

  /// 拼接视频并删除临时目录
  pub fn finish<T: Transcoder>(self, transcoder: &T) -> u64 {
    let count = self.count();
    let Some(scratch) = self.scratch else {
      return count;
    };

    if count == 0 {
      warn!("没有缓冲帧，跳过拼接");
      return 0;
    }

    let duration = self.duration;
    let fps = assembly_rate(count, duration);
    info!(
      "拼接 {} 个缓冲帧 ({:.3}s) 为视频，帧率 {:.3}: {}",
      count,
      duration,
      fps,
      self.output.display()
    );

    let params = AssembleParams {
      pattern: scratch.path.join(format!("{}%08d.png", BUFFER_FILE_PREFIX)),
      fps,
      output: self.output.clone(),
    };
    if let Err(e) = transcoder.assemble(&params) {
      error!("视频拼接失败: {}", e);
    }

    // scratch 在此处自动清理
    count
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn two_hundred_fifty_frames_over_ten_seconds_is_25_fps() {
    assert_eq!(assembly_rate(250, 10.0), 25.0);
  }

  #[test]
  fn assembly_rate_has_a_floor() {
    assert_eq!(assembly_rate(3, 10.0), 1.0);
    assert_eq!(assembly_rate(0, 10.0), 1.0);
    assert_eq!(assembly_rate(5, 0.0), 5.0 / MIN_DURATION);
  }

  #[test]
  fn buffer_files_are_zero_padded() {
    assert_eq!(buffer_file_name(0), "buf_00000000.png");
    assert_eq!(buffer_file_name(1234), "buf_00001234.png");
  }

  #[test]
  fn unwritable_root_disables_the_sink() {
    let sink = DiskBufferSink::new("/tmp/out.mp4", 10.0, Path::new("/proc/shanan/none"), 4);
    assert!(sink.is_disabled());
  }
}
