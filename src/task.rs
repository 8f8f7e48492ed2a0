// 该文件是 TramCV（电车视距）项目的一部分。
// src/task.rs - 帧处理任务
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

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use tracing::{debug, info, warn};

use crate::{
  frame::VideoFrame,
  model::{DetectResult, Model},
  monitor::PerformanceMonitor,
  output::{Render, draw::Draw},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 一次运行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskSummary {
  pub frames: u64,
  pub detections: usize,
}

/// 逐帧处理：检测、测距标注、性能叠加、写出
///
/// 一帧写完才读下一帧。来源耗尽或达到帧数上限时结束，
/// 任何检测或读写错误都会中止任务。
pub struct ContinuousTask {
  draw: Draw,
  max_frames: Option<u64>,
  monitor_interval: Duration,
}

impl ContinuousTask {
  pub fn new(draw: Draw) -> Self {
    Self {
      draw,
      max_frames: None,
      monitor_interval: Duration::from_secs(5),
    }
  }

  /// 帧数上限，`0` 表示不限制
  pub fn with_max_frames(mut self, max_frames: u64) -> Self {
    self.max_frames = (max_frames > 0).then_some(max_frames);
    self
  }

  pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
    self.monitor_interval = interval;
    self
  }
}

impl<I, M, O, IE, ME, RE> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = Result<VideoFrame, IE>>,
  M: Model<Input = VideoFrame, Output = DetectResult, Error = ME>,
  O: Render<Error = RE>,
  IE: std::error::Error + Send + Sync + 'static,
  ME: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, mut output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let mut monitor = PerformanceMonitor::new(self.monitor_interval);
    let mut summary = TaskSummary::default();

    loop {
      // 先判断上限再取帧，避免多解码一帧
      if self.max_frames.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      let Some(frame) = input.next() else {
        break;
      };

      let started = Instant::now();
      let frame = frame?;
      let index = frame.index;
      let result = model.infer(&frame)?;
      debug!(
        "帧 {}: {} 个目标, 耗时 {:.1}ms (预处理 {:.1} / 推理 {:.1} / 后处理 {:.1})",
        index,
        result.len(),
        result.speed.total(),
        result.speed.preprocess,
        result.speed.inference,
        result.speed.postprocess
      );

      summary.detections += result.len();
      output.render_result(&self.draw, frame, &result)?;
      summary.frames += 1;
      monitor.record(started.elapsed());
    }

    output.finish()?;
    monitor.log();
    info!(
      "任务完成: 共 {} 帧, {} 个检测目标",
      summary.frames, summary.detections
    );
    Ok(summary)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkReport {
  pub runs: usize,
  pub average: Duration,
  pub min: Duration,
  pub max: Duration,
}

/// 对同一帧反复推理，统计去掉预热后的平均耗时
pub struct BenchmarkTask {
  draw: Draw,
  repeat: usize,
  warmup: usize,
}

impl BenchmarkTask {
  pub fn new(draw: Draw, repeat: usize) -> Self {
    Self {
      draw,
      repeat,
      warmup: 3,
    }
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

impl<I, M, O, IE, ME, RE> Task<I, M, O> for BenchmarkTask
where
  I: Iterator<Item = Result<VideoFrame, IE>>,
  M: Model<Input = VideoFrame, Output = DetectResult, Error = ME>,
  O: Render<Error = RE>,
  IE: std::error::Error + Send + Sync + 'static,
  ME: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Output = BenchmarkReport;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, mut output: O) -> Result<Self::Output, Self::Error> {
    if self.repeat <= self.warmup {
      bail!(
        "重复次数 {} 必须大于预热次数 {}",
        self.repeat,
        self.warmup
      );
    }

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");

    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      debug!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    let measured = &times[self.warmup..];
    let report = BenchmarkReport {
      runs: measured.len(),
      average: measured.iter().sum::<Duration>() / measured.len() as u32,
      min: measured.iter().min().copied().unwrap_or_default(),
      max: measured.iter().max().copied().unwrap_or_default(),
    };
    warn!(
      "平均推理时间: {:.2?} (最小 {:.2?} / 最大 {:.2?}, {} 次)",
      report.average, report.min, report.max, report.runs
    );

    if let Some(result) = last {
      output.render_result(&self.draw, frame, &result)?;
    }
    output.finish()?;

    Ok(report)
  }
}
