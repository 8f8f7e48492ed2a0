// 该文件是 TramCV（电车视距）项目的一部分。
// src/main.rs - 项目主程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 TramCV Contributors

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, info};

use tramcv::{
  FromUrl,
  config::Settings,
  frame::VideoFrame,
  input::InputWrapper,
  model::{Yolo, YoloBuilder},
  output::{OutputWrapper, draw::Draw},
  sink_to_url, source_to_url,
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  let args = args::Args::parse();

  tracing_subscriber::fmt()
    .with_max_level(if args.verbose {
      Level::DEBUG
    } else {
      Level::INFO
    })
    .init();

  let mut settings = Settings::load(args.config.as_deref())?;
  if let Some(model) = args.model {
    settings.model.path = model;
  }
  if let Some(output) = args.output {
    settings.output = output;
  }

  let source_url = source_to_url(&args.source).context("无法解析输入来源")?;
  info!("输入来源: {}", source_url);
  info!("模型文件路径: {}", settings.model.path.display());

  let model: Yolo<VideoFrame> = YoloBuilder::from_settings(&settings.model).build()?;
  let input = InputWrapper::from_url(&source_url)?;
  info!(
    "输入源已打开: {}x{} @ {}/{} fps",
    input.width(),
    input.height(),
    input.fps().0,
    input.fps().1
  );

  // 输出帧率与输入一致
  let mut output_url = sink_to_url(&settings.output).context("无法解析输出路径")?;
  if output_url.scheme() == "gst" && !output_url.query_pairs().any(|(k, _)| k == "fps") {
    let (numer, denom) = input.fps();
    output_url
      .query_pairs_mut()
      .append_pair("fps", &format!("{}/{}", numer, denom));
  }
  info!("输出路径: {}", output_url);
  let output = OutputWrapper::from_url(&output_url)?;

  let draw = Draw::from_settings(&settings);
  let summary = ContinuousTask::new(draw)
    .with_max_frames(args.max_frames)
    .with_monitor_interval(settings.monitor_interval)
    .run_task(input.into_frames(), model, output)?;

  info!(
    "处理完成: 总帧数 {}, 总检测数 {}, 输出 {}",
    summary.frames, summary.detections, settings.output
  );

  Ok(())
}
