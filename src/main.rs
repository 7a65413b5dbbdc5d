// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use shanan_guard::{
  alarm::AlarmController,
  error::RunError,
  input::{FrameSource, InputWrapper, open_input},
  model::{ClassNames, Model},
  output::{
    FfmpegTranscoder, FfmpegVideoBackend, SinkConfig, SinkManager, VideoBackend, draw::Draw,
    snapshot::SnapshotWriter,
  },
  task::{InspectionTask, RunSummary, Task},
};

use args::Args;

const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
  let args = Args::parse();
  tracing_subscriber::fmt()
    .with_max_level(args.max_level())
    .init();

  match run(&args) {
    Ok(_) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{:#}", e);
      let code = e
        .downcast_ref::<RunError>()
        .map(RunError::exit_code)
        .unwrap_or(EXIT_FAILURE);
      ExitCode::from(code)
    }
  }
}

fn run(args: &Args) -> Result<RunSummary> {
  info!("模型文件路径: {}", args.model.display());
  info!("输入来源: {}", args.input);
  info!("输出目录: {}", args.output_dir.display());
  info!("模型输入尺寸: {}x{}", args.input_width, args.input_height);
  info!("置信度阈值: {}", args.conf);

  let alarm_dir = args.alarm_dir();
  for dir in [&args.output_dir, &alarm_dir] {
    std::fs::create_dir_all(dir)
      .map_err(RunError::from)
      .with_context(|| format!("无法创建目录 {}", dir.display()))?;
  }

  let names = match ClassNames::from_file(&args.names) {
    Ok(names) => {
      info!("已加载 {} 个类别", names.len());
      names
    }
    Err(e) => {
      warn!("{}，无法确定类别数", e);
      ClassNames::default()
    }
  };

  let model = load_model(args, &names)?;
  let input = open_input(&args.input, args.img_fps).map_err(RunError::from)?;

  let task = InspectionTask::new(
    args.task_options(),
    names,
    SnapshotWriter::new(alarm_dir, args.alarm_record),
  )
  .with_alarm(AlarmController::new(args.alarm_classes.iter().cloned()))
  .with_draw(Draw::new(args.font.as_deref()));

  #[cfg(feature = "gstreamer_output")]
  {
    match shanan_guard::output::GStreamerVideoBackend::new() {
      Ok(backend) => return execute(args, task, input, model, backend),
      Err(e) => warn!("GStreamer 视频输出不可用，改用 ffmpeg: {}", e),
    }
  }

  execute(args, task, input, model, FfmpegVideoBackend::new(&args.ffmpeg))
}

fn execute<M: Model, B: VideoBackend>(
  args: &Args,
  task: InspectionTask,
  input: InputWrapper,
  model: M,
  backend: B,
) -> Result<RunSummary> {
  let config = SinkConfig::select(&args.sink_request(input.kind()));
  if config.is_none() {
    info!("未配置视频输出，只保存告警截图");
  }
  let sinks = SinkManager::new(&config, backend, FfmpegTranscoder::new(&args.ffmpeg));

  Ok(task.run_task(input, model, sinks)?)
}

#[cfg(feature = "rknpu_engine")]
fn load_model(args: &Args, names: &ClassNames) -> Result<impl Model> {
  use shanan_guard::model::RknnEngine;

  let shape = [1, 3, args.input_height as usize, args.input_width as usize];
  RknnEngine::load(&args.model, names.len(), &shape)
    .map_err(|e| RunError::EngineContext(e.to_string()))
    .context("模型加载失败")
}

#[cfg(not(feature = "rknpu_engine"))]
fn load_model(args: &Args, _names: &ClassNames) -> Result<NoEngine> {
  Err(RunError::EngineContext(format!(
    "{}: 未启用推理引擎（需要 rknpu_engine 特性）",
    args.model.display()
  )))
  .context("模型加载失败")
}

/// 未编译推理引擎时的占位类型，不会被构造
#[cfg(not(feature = "rknpu_engine"))]
enum NoEngine {}

#[cfg(not(feature = "rknpu_engine"))]
impl Model for NoEngine {
  type Error = RunError;

  fn infer(
    &self,
    _input: &shanan_guard::frame::TensorBuffer,
  ) -> Result<shanan_guard::frame::TensorBuffer, Self::Error> {
    match *self {}
  }
}
