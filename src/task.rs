// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 逐帧检测任务
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

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::{
  alarm::{AlarmController, AlarmDecision, snapshot_file_name},
  error::RunError,
  frame::{Frame, TensorBuffer},
  input::FrameSource,
  model::{
    ClassNames, DEFAULT_CONFIDENCE, Decoder, DetectItem, LetterboxParams, Model, letterbox_into,
    nms,
  },
  output::{
    SinkFrame, SinkManager, SinkReport, Transcoder, VideoBackend, draw::Draw,
    snapshot::SnapshotWriter,
  },
};

pub const DEFAULT_PROGRESS_EVERY: u64 = 50;

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct TaskOptions {
  pub model_width: u32,
  pub model_height: u32,
  pub confidence: f32,
  /// 流输入的最长采集时长（秒），0 表示不限
  pub max_duration: f64,
  pub progress_every: u64,
}

impl Default for TaskOptions {
  fn default() -> Self {
    Self {
      model_width: 640,
      model_height: 640,
      confidence: DEFAULT_CONFIDENCE,
      max_duration: 0.0,
      progress_every: DEFAULT_PROGRESS_EVERY,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
  pub frames_processed: u64,
  pub frames_skipped: u64,
  pub detections: u64,
  pub alarms_saved: u64,
  pub alarms_suppressed: u64,
  pub sinks: SinkReport,
}

/// 一次运行中跨帧共享的可变状态
struct PipelineState {
  alarm: AlarmController,
  tensor: TensorBuffer,
  started: Option<Instant>,
  summary: RunSummary,
}

/// 单帧处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
  /// 已标注，交给输出
  Processed,
  /// 跳过，不计数也不输出
  Skipped,
  /// 推理失败，结束循环
  Stop,
}

/// 顺序执行的检测任务
///
/// 每帧依次完成预处理、推理、解码、NMS、标注、告警与输出分发，然后才读取下一帧。
pub struct InspectionTask {
  options: TaskOptions,
  decoder: Decoder,
  names: ClassNames,
  alarm: AlarmController,
  draw: Draw,
  snapshot: SnapshotWriter,
}

impl InspectionTask {
  pub fn new(options: TaskOptions, names: ClassNames, snapshot: SnapshotWriter) -> Self {
    Self {
      decoder: Decoder::new(options.confidence),
      options,
      names,
      alarm: AlarmController::default(),
      draw: Draw::without_font(),
      snapshot,
    }
  }

  pub fn with_alarm(mut self, alarm: AlarmController) -> Self {
    self.alarm = alarm;
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn process_frame<M: Model>(
    &self,
    state: &mut PipelineState,
    model: &M,
    frame: &mut Frame,
    is_video: bool,
    name: Option<&str>,
  ) -> FrameOutcome {
    if frame.width() == 0 || frame.height() == 0 {
      warn!("帧 {} 尺寸为零，跳过", frame.index + 1);
      return FrameOutcome::Skipped;
    }

    let params = LetterboxParams::compute(
      frame.width(),
      frame.height(),
      self.options.model_width,
      self.options.model_height,
    );
    if let Err(e) = letterbox_into(&frame.image, &params, &mut state.tensor) {
      warn!("帧 {} 预处理失败: {}", frame.index + 1, e);
      return FrameOutcome::Skipped;
    }

    let output = match model.infer(&state.tensor) {
      Ok(output) => output,
      Err(e) => {
        error!("帧 {} 推理失败，停止处理: {}", frame.index + 1, e);
        return FrameOutcome::Stop;
      }
    };

    let detections = nms(self.decoder.decode(&output, &params));

    if is_video {
      info!(
        "帧 {} 时间 {:.3}s 检测数 {}",
        frame.index + 1,
        frame.timestamp,
        detections.len()
      );
    } else {
      info!(
        "图像 {} 检测数 {}",
        name.unwrap_or("<未知>"),
        detections.len()
      );
    }

    self.annotate(frame, &detections);
    state.summary.detections += detections.len() as u64;

    let labels: Vec<_> = detections
      .iter()
      .map(|d| self.names.label(d.class_id))
      .collect();
    match state
      .alarm
      .evaluate(labels.iter().map(|l| l.as_ref()), frame.timestamp)
    {
      AlarmDecision::Persist => {
        let file_name = snapshot_file_name(is_video, frame.timestamp, frame.index);
        match self
          .snapshot
          .save(&frame.image, &file_name, frame, &detections, &self.names)
        {
          Ok(path) => {
            info!("告警截图已保存: {}", path.display());
            state.summary.alarms_saved += 1;
          }
          Err(e) => error!("保存告警截图失败 {}: {}", file_name, e),
        }
      }
      AlarmDecision::Suppressed => state.summary.alarms_suppressed += 1,
      AlarmDecision::Idle => {}
    }

    FrameOutcome::Processed
  }

  fn annotate(&self, frame: &mut Frame, detections: &[DetectItem]) {
    for d in detections {
      let name = self.names.label(d.class_id);
      let alarm = self.alarm.is_alarm_class(&name);
      info!(
        "类别: {}, 置信度: {:.2}, 框: [{},{},{},{}]",
        name,
        d.score,
        d.bbox[0].round() as i32,
        d.bbox[1].round() as i32,
        d.bbox[2].round() as i32,
        d.bbox[3].round() as i32
      );
      self
        .draw
        .draw_detection(&mut frame.image, &d.bbox, &name, d.score, alarm);
    }
  }
}

impl<I, M, B, T> Task<I, M, SinkManager<B, T>> for InspectionTask
where
  I: FrameSource,
  M: Model,
  B: VideoBackend,
  T: Transcoder,
{
  type Output = RunSummary;
  type Error = RunError;

  fn run_task(
    self,
    mut input: I,
    model: M,
    mut sinks: SinkManager<B, T>,
  ) -> Result<Self::Output, Self::Error> {
    let shape = [
      1,
      3,
      self.options.model_height as usize,
      self.options.model_width as usize,
    ];
    let tensor = TensorBuffer::try_with_shape(&shape)?;
    debug!("输入张量已分配: {:?}", shape);

    let kind = input.kind();
    let mut state = PipelineState {
      alarm: self.alarm.clone(),
      tensor,
      started: None,
      summary: RunSummary::default(),
    };

    info!("开始任务...");
    while let Some(next) = input.next() {
      let mut frame = match next {
        Ok(frame) => frame,
        Err(e) => {
          warn!("读取帧失败，跳过: {}", e);
          state.summary.frames_skipped += 1;
          continue;
        }
      };

      if kind.is_stream() {
        let started = *state.started.get_or_insert_with(Instant::now);
        let elapsed = started.elapsed().as_secs_f64();
        if self.options.max_duration > 0.0 && elapsed >= self.options.max_duration {
          info!("达到采集时长 {:.1}s，停止读取", self.options.max_duration);
          break;
        }
      }

      let name = input.current_name().map(str::to_owned);
      match self.process_frame(&mut state, &model, &mut frame, kind.is_video(), name.as_deref()) {
        FrameOutcome::Processed => state.summary.frames_processed += 1,
        FrameOutcome::Skipped => {
          state.summary.frames_skipped += 1;
          continue;
        }
        FrameOutcome::Stop => break,
      }

      let processed = state.summary.frames_processed;
      if self.options.progress_every > 0 && processed % self.options.progress_every == 0 {
        info!("已处理 {} 帧", processed);
      }

      sinks.dispatch(&SinkFrame {
        image: &frame.image,
        index: frame.index,
        timestamp: frame.timestamp,
        source_fps: input.fps(),
      });
    }

    state.summary.sinks = sinks.finish();

    let s = &state.summary;
    info!(
      "任务完成: 处理 {} 帧, 跳过 {} 帧, 检测 {} 个, 告警截图 {} 张, 限速抑制 {} 次",
      s.frames_processed, s.frames_skipped, s.detections, s.alarms_saved, s.alarms_suppressed
    );
    Ok(state.summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_options_match_command_line_defaults() {
    let options = TaskOptions::default();
    assert_eq!(options.confidence, 0.25);
    assert_eq!(options.max_duration, 0.0);
    assert_eq!(options.progress_every, 50);
  }
}
