// 该文件是 TramCV（电车视距）项目的一部分。
// src/model.rs - 模型
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

use std::cmp::Ordering;
use std::time::Duration;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }
}

/// 各阶段耗时（毫秒）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
  pub preprocess: f64,
  pub inference: f64,
  pub postprocess: f64,
}

impl Speed {
  pub fn from_durations(preprocess: Duration, inference: Duration, postprocess: Duration) -> Self {
    Self {
      preprocess: preprocess.as_secs_f64() * 1000.0,
      inference: inference.as_secs_f64() * 1000.0,
      postprocess: postprocess.as_secs_f64() * 1000.0,
    }
  }

  /// 单帧总耗时
  pub fn total(&self) -> f64 {
    self.preprocess + self.inference + self.postprocess
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  pub speed: Speed,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别编号到名称的映射
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
  names: Vec<String>,
}

impl Default for Labels {
  fn default() -> Self {
    Self::coco()
  }
}

impl From<Vec<String>> for Labels {
  fn from(names: Vec<String>) -> Self {
    Self { names }
  }
}

impl Labels {
  pub fn coco() -> Self {
    Self {
      names: COCO_CLASSES.iter().map(|name| name.to_string()).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 类别名称，越界时返回 `class_{id}`
  pub fn name(&self, class_id: u32) -> String {
    self
      .names
      .get(class_id as usize)
      .cloned()
      .unwrap_or_else(|| format!("class_{}", class_id))
  }
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x_min = a[0].max(b[0]);
  let y_min = a[1].max(b[1]);
  let x_max = a[2].min(b[2]);
  let y_max = a[3].min(b[3]);

  let intersection = (x_max - x_min).max(0.0) * (y_max - y_min).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union <= 0.0 {
    0.0
  } else {
    intersection / union
  }
}

/// 按类别进行非极大值抑制，结果按置信度降序
pub fn non_maximum_suppression(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

  let mut kept: Vec<DetectItem> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) > iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

mod yolo;
pub use self::yolo::{Letterbox, Yolo, YoloBuilder, YoloError};

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      label: Labels::coco().name(class_id),
      score,
      bbox,
    }
  }

  #[test]
  fn speed_total_sums_stages() {
    let speed = Speed::from_durations(
      Duration::from_millis(3),
      Duration::from_millis(40),
      Duration::from_millis(2),
    );
    assert!((speed.total() - 45.0).abs() < 1e-9);
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
    assert!((half - 50.0 / 150.0).abs() < 1e-6);
  }

  #[test]
  fn nms_suppresses_same_class_overlap() {
    let items = vec![
      item(2, 0.6, [0.0, 0.0, 100.0, 100.0]),
      item(2, 0.9, [5.0, 5.0, 105.0, 105.0]),
      item(2, 0.8, [300.0, 300.0, 400.0, 400.0]),
    ];
    let kept = non_maximum_suppression(items, 0.45);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.8);
  }

  #[test]
  fn nms_keeps_overlapping_boxes_of_different_classes() {
    let items = vec![
      item(0, 0.7, [0.0, 0.0, 100.0, 100.0]),
      item(1, 0.8, [0.0, 0.0, 100.0, 100.0]),
    ];
    assert_eq!(non_maximum_suppression(items, 0.45).len(), 2);
  }

  #[test]
  fn label_lookup_falls_back_to_class_id() {
    let labels = Labels::coco();
    assert_eq!(labels.len(), 80);
    assert_eq!(labels.name(0), "person");
    assert_eq!(labels.name(7), "truck");
    assert_eq!(labels.name(80), "class_80");

    let custom = Labels::from(vec!["tram".to_string()]);
    assert_eq!(custom.name(0), "tram");
  }
}
