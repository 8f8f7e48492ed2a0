// 该文件是 TramCV（电车视距）项目的一部分。
// src/monitor.rs - 性能监控
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

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::info;

/// 样本数超过该值时裁剪窗口
const WINDOW_LIMIT: usize = 1000;
/// 裁剪后保留的最近样本数
const WINDOW_KEEP: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceStats {
  pub average: Duration,
  pub max: Duration,
  pub min: Duration,
  pub fps: f64,
}

/// 滚动窗口性能统计，按固定间隔输出日志
#[derive(Debug)]
pub struct PerformanceMonitor {
  samples: VecDeque<Duration>,
  frame_count: u64,
  log_interval: Duration,
  last_log: Instant,
}

impl Default for PerformanceMonitor {
  fn default() -> Self {
    Self::new(Duration::from_secs(5))
  }
}

impl PerformanceMonitor {
  pub fn new(log_interval: Duration) -> Self {
    Self {
      samples: VecDeque::with_capacity(WINDOW_LIMIT + 1),
      frame_count: 0,
      log_interval,
      last_log: Instant::now(),
    }
  }

  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  pub fn window_len(&self) -> usize {
    self.samples.len()
  }

  /// 记录一帧耗时；距上次输出超过间隔时打印统计
  pub fn record(&mut self, elapsed: Duration) {
    self.push(elapsed);
    if self.last_log.elapsed() >= self.log_interval {
      self.log();
      self.last_log = Instant::now();
    }
  }

  fn push(&mut self, elapsed: Duration) {
    self.samples.push_back(elapsed);
    self.frame_count += 1;
    if self.samples.len() > WINDOW_LIMIT {
      let excess = self.samples.len() - WINDOW_KEEP;
      self.samples.drain(..excess);
    }
  }

  pub fn stats(&self) -> Option<PerformanceStats> {
    let max = self.samples.iter().max().copied()?;
    let min = self.samples.iter().min().copied()?;
    let average = self.samples.iter().sum::<Duration>() / self.samples.len() as u32;
    let fps = if average.is_zero() {
      0.0
    } else {
      1.0 / average.as_secs_f64()
    };

    Some(PerformanceStats {
      average,
      max,
      min,
      fps,
    })
  }

  pub fn log(&self) {
    if let Some(stats) = self.stats() {
      info!(
        "[Performance] FPS: {:.1}, Avg: {:.1}ms, Max: {:.1}ms, Frames: {}",
        stats.fps,
        stats.average.as_secs_f64() * 1000.0,
        stats.max.as_secs_f64() * 1000.0,
        self.frame_count
      );
    }
  }
}
