// 该文件是 TramCV（电车视距）项目的一部分。
// src/bin/benchmark.rs - 推理耗时基准
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tramcv::{
  FromUrl,
  config::Settings,
  frame::VideoFrame,
  input::InputWrapper,
  model::{Yolo, YoloBuilder},
  output::{OutputWrapper, draw::Draw},
  sink_to_url, source_to_url,
  task::{BenchmarkTask, Task},
};

/// 对输入的第一帧重复推理，报告平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源（图片或视频，取第一帧）
  #[arg(long, value_name = "SOURCE")]
  pub source: String,
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// ONNX 模型文件路径
  #[arg(long, value_name = "FILE")]
  pub model: Option<PathBuf>,
  /// 最后一次结果的输出位置
  #[arg(long, value_name = "OUTPUT", default_value = "folder:///tmp/tramcv-benchmark")]
  pub output: String,
  /// 推理次数
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub repeat: usize,
  /// 不计入统计的预热次数
  #[arg(long, default_value = "3", value_name = "COUNT")]
  pub warmup: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let mut settings = Settings::load(args.config.as_deref())?;
  if let Some(model) = args.model {
    settings.model.path = model;
  }

  let source_url = source_to_url(&args.source).context("无法解析输入来源")?;
  let output_url = sink_to_url(&args.output).context("无法解析输出路径")?;
  info!("模型文件路径: {}", settings.model.path.display());
  info!("输入来源: {}", source_url);
  info!("输出路径: {}", output_url);

  let model: Yolo<VideoFrame> = YoloBuilder::from_settings(&settings.model).build()?;
  let input = InputWrapper::from_url(&source_url)?;
  let output = OutputWrapper::from_url(&output_url)?;

  let report = BenchmarkTask::new(Draw::from_settings(&settings), args.repeat)
    .with_warmup(args.warmup)
    .run_task(input.into_frames(), model, output)?;

  info!(
    "{} 次有效推理: 平均 {:.2?}, 最小 {:.2?}, 最大 {:.2?}",
    report.runs, report.average, report.min, report.max
  );

  Ok(())
}
