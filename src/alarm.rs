// 该文件是 Shanan （山南西风） 项目的一部分。
// src/alarm.rs - 告警截图限速
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

use std::collections::HashSet;

use tracing::debug;

/// 默认告警类别：未穿反光衣、未戴安全帽
pub const DEFAULT_ALARM_CLASSES: [&str; 2] = ["no_vest", "head"];
/// 两次告警截图之间的最小间隔（秒）
pub const ALARM_INTERVAL_SECS: f64 = 1.0;
const NEVER_ALARMED: f64 = -1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmDecision {
  /// 没有告警类别
  Idle,
  /// 需要保存截图
  Persist,
  /// 有告警但被限速
  Suppressed,
}

/// 告警控制器
///
/// 时间轴为当前输入的时间：视频/流使用源时间戳，图像序列使用 `index / 假定帧率`，
/// 因此不同输入下的限速都等价于墙钟时间。
#[derive(Debug, Clone)]
pub struct AlarmController {
  alarm_names: HashSet<String>,
  last_alarm_time: f64,
  interval: f64,
}

impl Default for AlarmController {
  fn default() -> Self {
    Self::new(DEFAULT_ALARM_CLASSES)
  }
}

impl AlarmController {
  pub fn new<I, S>(alarm_names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      alarm_names: alarm_names.into_iter().map(Into::into).collect(),
      last_alarm_time: NEVER_ALARMED,
      interval: ALARM_INTERVAL_SECS,
    }
  }

  pub fn is_alarm_class(&self, name: &str) -> bool {
    self.alarm_names.contains(name)
  }

  pub fn last_alarm_time(&self) -> f64 {
    self.last_alarm_time
  }

  /// 只在决定保存时更新状态；截图写入是否成功不影响限速
  pub fn evaluate<'a, I>(&mut self, class_names: I, frame_time: f64) -> AlarmDecision
  where
    I: IntoIterator<Item = &'a str>,
  {
    if !class_names.into_iter().any(|n| self.is_alarm_class(n)) {
      return AlarmDecision::Idle;
    }

    if frame_time - self.last_alarm_time >= self.interval {
      self.last_alarm_time = frame_time;
      AlarmDecision::Persist
    } else {
      debug!("告警被限速抑制 t={:.3}s", frame_time);
      AlarmDecision::Suppressed
    }
  }
}

/// 告警截图文件名；帧号从 1 开始
pub fn snapshot_file_name(is_video: bool, frame_time: f64, frame_index: u64) -> String {
  if is_video {
    format!("alarm_t{:06.0}_f{:06}.png", frame_time, frame_index + 1)
  } else {
    format!("alarm_f{:06}.png", frame_index + 1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_alarm_always_fires() {
    let mut alarm = AlarmController::default();
    assert_eq!(alarm.evaluate(["head"], 0.0), AlarmDecision::Persist);
    assert_eq!(alarm.last_alarm_time(), 0.0);
  }

  #[test]
  fn non_alarm_classes_are_idle() {
    let mut alarm = AlarmController::default();
    assert_eq!(alarm.evaluate(["helmet", "vest"], 5.0), AlarmDecision::Idle);
    assert_eq!(
      alarm.evaluate(std::iter::empty::<&str>(), 5.0),
      AlarmDecision::Idle
    );
    assert_eq!(alarm.last_alarm_time(), NEVER_ALARMED);
  }

  #[test]
  fn persisted_alarms_are_at_least_one_second_apart() {
    let mut alarm = AlarmController::new(["no_vest"]);
    let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.033 + 0.25).collect();
    let persisted: Vec<f64> = times
      .iter()
      .copied()
      .filter(|&t| alarm.evaluate(["no_vest"], t) == AlarmDecision::Persist)
      .collect();

    assert_eq!(persisted[0], times[0]);
    for pair in persisted.windows(2) {
      assert!(pair[1] - pair[0] >= ALARM_INTERVAL_SECS);
    }
    assert!(persisted.len() >= 6);
  }

  #[test]
  fn exact_interval_is_allowed() {
    let mut alarm = AlarmController::default();
    assert_eq!(alarm.evaluate(["head"], 2.0), AlarmDecision::Persist);
    assert_eq!(alarm.evaluate(["head"], 2.5), AlarmDecision::Suppressed);
    assert_eq!(alarm.evaluate(["head"], 3.0), AlarmDecision::Persist);
  }

  #[test]
  fn snapshot_names_encode_clock() {
    assert_eq!(snapshot_file_name(true, 12.4, 41), "alarm_t000012_f000042.png");
    assert_eq!(snapshot_file_name(false, 12.4, 41), "alarm_f000042.png");
  }
}
