// 该文件是 TramCV（电车视距）项目的一部分。
// src/model/yolo.rs - YOLO 目标检测模型（ONNX，CPU 推理）
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

//! # YOLO 检测模型
//!
//! 加载 ultralytics 导出的检测模型（YOLOv8 / YOLO11，ONNX 格式），
//! 使用 tract 在 CPU 上推理。模型本身不绘制任何内容，只返回检测框。
//!
//! 输入固定为 `[1, 3, S, S]` 的 f32 张量，输出为 `[1, 4 + C, N]`，
//! 每一列为 `(cx, cy, w, h, score_0 .. score_{C-1})`。

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::{
  config::ModelSettings,
  frame::{AsNhwcFrame, RGB_CHANNELS},
  model::{DetectItem, DetectResult, Labels, Model, Speed, non_maximum_suppression},
};

const LETTERBOX_FILL: u8 = 114;

type YoloPlan = TypedRunnableModel<TypedModel>;

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型加载失败 {path}: {reason:#}")]
  ModelLoad { path: PathBuf, reason: TractError },
  #[error("推理失败: {0:#}")]
  Inference(TractError),
  #[error("模型输出形状无效: {0}")]
  OutputShape(String),
  #[error("输入帧无效: {width}x{height}, {len} 字节")]
  InvalidFrame { width: u32, height: u32, len: usize },
  #[error("推理分辨率 {0} 不是 32 的正整数倍")]
  InvalidInputSize(u32),
}

impl From<TractError> for YoloError {
  fn from(err: TractError) -> Self {
    YoloError::Inference(err)
  }
}

/// 等比缩放并居中填充到正方形输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub size: u32,
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub resized_width: u32,
  pub resized_height: u32,
  pub source_width: u32,
  pub source_height: u32,
}

impl Letterbox {
  pub fn new(source_width: u32, source_height: u32, size: u32) -> Self {
    let size = size.max(1);
    let scale = (size as f32 / source_width as f32).min(size as f32 / source_height as f32);
    let resized_width = ((source_width as f32 * scale).round() as u32).clamp(1, size);
    let resized_height = ((source_height as f32 * scale).round() as u32).clamp(1, size);

    Self {
      size,
      scale,
      pad_x: (size - resized_width) / 2,
      pad_y: (size - resized_height) / 2,
      resized_width,
      resized_height,
      source_width,
      source_height,
    }
  }

  pub fn apply<C>(&self, source: &ImageBuffer<Rgb<u8>, C>) -> RgbImage
  where
    C: std::ops::Deref<Target = [u8]>,
  {
    let resized = imageops::resize(
      source,
      self.resized_width,
      self.resized_height,
      FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
    canvas
  }

  /// 将模型坐标系下的框还原到原图，并裁剪到图像范围内
  pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.source_width as f32, self.source_height as f32);
    [
      ((bbox[0] - self.pad_x as f32) / self.scale).clamp(0.0, w),
      ((bbox[1] - self.pad_y as f32) / self.scale).clamp(0.0, h),
      ((bbox[2] - self.pad_x as f32) / self.scale).clamp(0.0, w),
      ((bbox[3] - self.pad_y as f32) / self.scale).clamp(0.0, h),
    ]
  }
}

pub struct YoloBuilder {
  model_path: PathBuf,
  input_size: u32,
  confidence: f32,
  iou: f32,
  labels: Labels,
}

impl YoloBuilder {
  pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      input_size: 320,
      confidence: 0.25,
      iou: 0.45,
      labels: Labels::coco(),
    }
  }

  pub fn from_settings(settings: &ModelSettings) -> Self {
    let builder = Self::new(&settings.path)
      .input_size(settings.input_size)
      .confidence(settings.confidence)
      .iou(settings.iou);
    match &settings.labels {
      Some(labels) => builder.labels(Labels::from(labels.clone())),
      None => builder,
    }
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.iou = iou;
    self
  }

  pub fn labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self
  }

  pub fn build<Frame>(self) -> Result<Yolo<Frame>, YoloError> {
    if self.input_size == 0 || self.input_size % 32 != 0 {
      return Err(YoloError::InvalidInputSize(self.input_size));
    }
    info!("加载模型文件: {}", self.model_path.display());
    let size = self.input_size as usize;
    let load = |path: &Path| -> TractResult<YoloPlan> {
      tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(
          0,
          InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
        )?
        .into_optimized()?
        .into_runnable()
    };
    let plan = load(&self.model_path).map_err(|reason| YoloError::ModelLoad {
      path: self.model_path.clone(),
      reason,
    })?;
    info!(
      "模型加载完成，推理分辨率 {}x{}，类别数 {}",
      self.input_size,
      self.input_size,
      self.labels.len()
    );

    Ok(Yolo {
      plan,
      input_size: self.input_size,
      confidence: self.confidence,
      iou: self.iou,
      labels: self.labels,
      _phantom: PhantomData,
    })
  }
}

pub struct Yolo<Frame> {
  plan: YoloPlan,
  input_size: u32,
  confidence: f32,
  iou: f32,
  labels: Labels,
  _phantom: PhantomData<Frame>,
}

impl<Frame> Yolo<Frame> {
  pub fn labels(&self) -> &Labels {
    &self.labels
  }

  fn preprocess<F: AsNhwcFrame>(&self, frame: &F) -> Result<(Tensor, Letterbox), YoloError> {
    let (width, height) = (frame.width(), frame.height());
    let data = frame.as_nhwc();
    let invalid = || YoloError::InvalidFrame {
      width,
      height,
      len: data.len(),
    };
    if width == 0 || height == 0 {
      return Err(invalid());
    }
    let source: ImageBuffer<Rgb<u8>, &[u8]> =
      ImageBuffer::from_raw(width, height, data).ok_or_else(invalid)?;

    let letterbox = Letterbox::new(width, height, self.input_size);
    let canvas = letterbox.apply(&source);
    let size = self.input_size as usize;
    let pixels = canvas.as_raw();
    let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
      pixels[(y * size + x) * RGB_CHANNELS + c] as f32 / 255.0
    });

    Ok((input.into_tensor(), letterbox))
  }
}

impl<Frame: AsNhwcFrame> Model for Yolo<Frame> {
  type Input = Frame;
  type Output = DetectResult;
  type Error = YoloError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let start = Instant::now();
    let (tensor, letterbox) = self.preprocess(input)?;
    let preprocess = start.elapsed();

    let start = Instant::now();
    let outputs = self.plan.run(tvec!(tensor.into()))?;
    let inference = start.elapsed();

    let start = Instant::now();
    let output = outputs
      .first()
      .ok_or_else(|| YoloError::OutputShape("模型没有输出".to_string()))?
      .to_array_view::<f32>()?;
    let candidates = decode(&output, &letterbox, self.confidence, &self.labels)?;
    let candidate_count = candidates.len();
    let items = non_maximum_suppression(candidates, self.iou);
    let postprocess = start.elapsed();

    let speed = Speed::from_durations(preprocess, inference, postprocess);
    debug!(
      "检测到 {} 个物体（NMS 前 {}），耗时 {:.1}ms / {:.1}ms / {:.1}ms",
      items.len(),
      candidate_count,
      speed.preprocess,
      speed.inference,
      speed.postprocess
    );

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      speed,
    })
  }
}

/// 解析原始输出张量，返回置信度达标的候选框（未做 NMS）
///
/// 同时接受 `[1, 4 + C, N]` 与转置后的 `[1, N, 4 + C]`。属性维优先按类别数匹配，
/// 匹配不上时取较短的一维。
pub fn decode(
  output: &tract_ndarray::ArrayViewD<f32>,
  letterbox: &Letterbox,
  confidence: f32,
  labels: &Labels,
) -> Result<Vec<DetectItem>, YoloError> {
  let shape = output.shape();
  if shape.len() != 3 || shape[0] != 1 {
    return Err(YoloError::OutputShape(format!("{:?}", shape)));
  }
  let view = output.index_axis(tract_ndarray::Axis(0), 0);
  let attributes = 4 + labels.len();
  let channels_first = if shape[1] == attributes {
    true
  } else if shape[2] == attributes {
    false
  } else {
    shape[1] <= shape[2]
  };
  let rows = if channels_first {
    view.reversed_axes()
  } else {
    view
  };
  if rows.shape()[1] <= 4 {
    return Err(YoloError::OutputShape(format!(
      "{:?}: 缺少类别分数",
      shape
    )));
  }

  let mut items = Vec::new();
  for row in rows.outer_iter() {
    let (class_id, score) = row
      .iter()
      .skip(4)
      .enumerate()
      .fold((0usize, f32::MIN), |best, (idx, &score)| {
        if score > best.1 { (idx, score) } else { best }
      });
    if score < confidence {
      continue;
    }

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    let bbox = letterbox.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
    items.push(DetectItem {
      class_id: class_id as u32,
      label: labels.name(class_id as u32),
      score,
      bbox,
    });
  }

  Ok(items)
}
