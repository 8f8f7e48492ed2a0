// 该文件是 TramCV（电车视距）项目的一部分。
// src/output/draw.rs - 检测结果与性能信息叠加
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use tracing::{debug, info, warn};

use crate::{
  config::Settings,
  distance::DistanceEstimator,
  model::{DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const OVERLAY_FONT_SIZE: f32 = 24.0;
const BOX_THICKNESS: i32 = 2;
const LABEL_OFFSET: i32 = 10;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

pub const LOW_PERFORMANCE_TEXT: &str = "LOW PERFORMANCE!";

/// 内嵌字体 DejaVu Sans，许可见 `assets/FONT-LICENSE`
static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

/// 一行叠加文本，`(x, y)` 为基线左端
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayText {
  pub text: String,
  pub x: i32,
  pub y: i32,
  pub color: Rgb<u8>,
}

/// 帧标注器
///
/// 画检测框、`类别 置信度 距离` 标签，以及左上角的单帧耗时。
/// 默认使用内嵌字体。
pub struct Draw {
  estimator: DistanceEstimator,
  warn_threshold_ms: f64,
  font: FontArc,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(DistanceEstimator::default(), 100.0)
  }
}

impl Draw {
  pub fn new(estimator: DistanceEstimator, warn_threshold_ms: f64) -> Self {
    Self {
      estimator,
      warn_threshold_ms,
      font: embedded_font(),
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = font;
    self
  }

  pub fn from_settings(settings: &Settings) -> Self {
    Self::new(
      DistanceEstimator::new(settings.calibration.clone()),
      settings.overlay.warn_threshold_ms,
    )
    .with_font(load_font(settings.overlay.font.as_deref()))
  }

  pub fn estimator(&self) -> &DistanceEstimator {
    &self.estimator
  }

  /// 检测框标签：`"{class} {score:.2} {distance:.2}m"`，退化框距离显示 `--`
  pub fn detection_label(&self, item: &DetectItem) -> String {
    match self.estimator.estimate_bbox(&item.label, &item.bbox) {
      Ok(distance) => format!("{} {:.2} {:.2}m", item.label, item.score, distance),
      Err(e) => {
        debug!("Distance unavailable for {}: {}", item.label, e);
        format!("{} {:.2} --", item.label, item.score)
      }
    }
  }

  /// 左上角的性能信息，耗时超过阈值时追加红色警告
  pub fn performance_lines(&self, frame_ms: f64, objects: usize) -> Vec<OverlayText> {
    let mut lines = vec![OverlayText {
      text: format!("Time per frame: {:.1}ms || Objects: {}", frame_ms, objects),
      x: 10,
      y: 30,
      color: WHITE,
    }];
    if frame_ms > self.warn_threshold_ms {
      lines.push(OverlayText {
        text: LOW_PERFORMANCE_TEXT.to_string(),
        x: 10,
        y: 60,
        color: RED,
      });
    }
    lines
  }

  /// 检测结果的文本记录，每个目标一行：`label, score, x1, y1, x2, y2, distance`
  pub fn record_lines(&self, result: &DetectResult) -> String {
    result
      .items
      .iter()
      .map(|item| {
        let distance = self
          .estimator
          .estimate_bbox(&item.label, &item.bbox)
          .map(|d| format!("{:.4}", d))
          .unwrap_or_else(|_| "--".to_string());
        format!(
          "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}, {}",
          item.label, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3], distance
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  /// 原地标注一帧
  pub fn annotate(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_bbox(image, &item.bbox);
      let x = item.bbox[0] as i32;
      let y = item.bbox[1] as i32 - LABEL_OFFSET;
      self.draw_text(image, &self.detection_label(item), x, y, LABEL_FONT_SIZE, WHITE);
    }

    for line in self.performance_lines(result.speed.total(), result.len()) {
      self.draw_text(image, &line.text, line.x, line.y, OVERLAY_FONT_SIZE, line.color);
    }
  }

  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0] as i32).clamp(0, w - 1);
    let y_min = (bbox[1] as i32).clamp(0, h - 1);
    let x_max = (bbox[2] as i32).clamp(0, w - 1);
    let y_max = (bbox[3] as i32).clamp(0, h - 1);

    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, WHITE);
    }
  }

  // `y` 为基线，换算成 imageproc 需要的文本顶端
  fn draw_text(&self, image: &mut RgbImage, text: &str, x: i32, y: i32, size: f32, color: Rgb<u8>) {
    let top = (y - size as i32).max(0);
    draw_text_mut(image, color, x.max(0), top, PxScale::from(size), &self.font, text);
  }
}

pub fn embedded_font() -> FontArc {
  FontArc::try_from_slice(EMBEDDED_FONT).expect("无法加载嵌入的字体文件")
}

/// 加载叠加文字所用字体
///
/// 未指定路径或加载失败时使用内嵌字体。
pub fn load_font(path: Option<&Path>) -> FontArc {
  let Some(path) = path else {
    return embedded_font();
  };

  let loaded = std::fs::read(path)
    .map_err(|e| e.to_string())
    .and_then(|data| FontArc::try_from_vec(data).map_err(|e| e.to_string()));
  match loaded {
    Ok(font) => {
      info!("Overlay font: {}", path.display());
      font
    }
    Err(e) => {
      warn!(
        "Invalid font {}: {}, using the embedded font",
        path.display(),
        e
      );
      embedded_font()
    }
  }
}
