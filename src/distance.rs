// 该文件是 TramCV（电车视距）项目的一部分。
// src/distance.rs - 单目测距
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

//! # 单目测距
//!
//! 基于小孔成像的相似三角形近似：
//!
//! ```text
//! distance = known_width * focal_length / pixel_width
//! ```
//!
//! 其中 `known_width` 为目标类别的假定真实宽度（米），`focal_length` 为以像素计的
//! 焦距常量（未经逐台相机标定），`pixel_width` 为检测框宽度 `x2 - x1`。
//! 要求目标宽度方向与光轴垂直。

use std::collections::HashMap;

use thiserror::Error;

pub const DEFAULT_FOCAL_LENGTH: f64 = 800.0;
pub const DEFAULT_OBJECT_WIDTH: f64 = 0.5;

/// 出厂类别宽度表（米）
const DEFAULT_KNOWN_WIDTHS: [(&str, f64); 6] = [
  ("person", 0.5),
  ("car", 1.8),
  ("bicycle", 0.7),
  ("motorcycle", 0.8),
  ("bus", 2.5),
  ("truck", 2.2),
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistanceError {
  /// 检测框宽度为零或左右颠倒
  #[error("退化的检测框: x1={x1}, x2={x2}")]
  DegenerateBox { x1: i32, x2: i32 },
  #[error("标定参数 {name} 必须为正有限值，实际为 {value}")]
  InvalidCalibration { name: String, value: f64 },
}

/// 标定表：类别宽度、焦距与缺省宽度
///
/// 启动时加载一次，之后只读。
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
  known_widths: HashMap<String, f64>,
  focal_length: f64,
  default_width: f64,
}

impl Default for Calibration {
  fn default() -> Self {
    Self {
      known_widths: DEFAULT_KNOWN_WIDTHS
        .iter()
        .map(|(name, width)| (name.to_string(), *width))
        .collect(),
      focal_length: DEFAULT_FOCAL_LENGTH,
      default_width: DEFAULT_OBJECT_WIDTH,
    }
  }
}

impl Calibration {
  pub fn new(
    known_widths: HashMap<String, f64>,
    focal_length: f64,
    default_width: f64,
  ) -> Result<Self, DistanceError> {
    check_positive("focal_length", focal_length)?;
    check_positive("default_width", default_width)?;
    for (name, width) in &known_widths {
      check_positive(&format!("known_widths.{}", name), *width)?;
    }

    Ok(Self {
      known_widths,
      focal_length,
      default_width,
    })
  }

  pub fn known_widths(&self) -> &HashMap<String, f64> {
    &self.known_widths
  }

  pub fn focal_length(&self) -> f64 {
    self.focal_length
  }

  pub fn default_width(&self) -> f64 {
    self.default_width
  }

  /// 类别的假定宽度，未登记的类别回退到缺省宽度
  pub fn width_for(&self, class_name: &str) -> f64 {
    self
      .known_widths
      .get(class_name)
      .copied()
      .unwrap_or(self.default_width)
  }
}

fn check_positive(name: &str, value: f64) -> Result<(), DistanceError> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(DistanceError::InvalidCalibration {
      name: name.to_string(),
      value,
    })
  }
}

#[derive(Debug, Clone, Default)]
pub struct DistanceEstimator {
  calibration: Calibration,
}

impl DistanceEstimator {
  pub fn new(calibration: Calibration) -> Self {
    Self { calibration }
  }

  pub fn calibration(&self) -> &Calibration {
    &self.calibration
  }

  /// 根据检测框左右边界估算距离（米）
  ///
  /// `x2 <= x1` 时返回 [`DistanceError::DegenerateBox`]，不做除法。
  pub fn estimate(&self, class_name: &str, x1: i32, x2: i32) -> Result<f64, DistanceError> {
    if x2 <= x1 {
      return Err(DistanceError::DegenerateBox { x1, x2 });
    }
    let pixel_width = f64::from(x2 - x1);
    let known_width = self.calibration.width_for(class_name);
    Ok((known_width * self.calibration.focal_length) / pixel_width)
  }

  /// 以浮点坐标估算，坐标先截断为整数像素
  pub fn estimate_bbox(&self, class_name: &str, bbox: &[f32; 4]) -> Result<f64, DistanceError> {
    self.estimate(class_name, bbox[0] as i32, bbox[2] as i32)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn estimator(widths: &[(&str, f64)], focal_length: f64) -> DistanceEstimator {
    let known_widths = widths
      .iter()
      .map(|(name, width)| (name.to_string(), *width))
      .collect();
    DistanceEstimator::new(
      Calibration::new(known_widths, focal_length, DEFAULT_OBJECT_WIDTH).unwrap(),
    )
  }

  #[test]
  fn person_at_hundred_pixels() {
    let estimator = estimator(&[("person", 0.5)], 800.0);
    let distance = estimator.estimate("person", 100, 200).unwrap();
    assert_eq!(distance, 4.0);
    assert_eq!(distance * 100.0, 400.0); // cm
  }

  #[test]
  fn car_at_two_hundred_pixels() {
    let estimator = estimator(&[("car", 1.8)], 800.0);
    let distance = estimator.estimate("car", 150, 350).unwrap();
    assert!((distance - 7.2).abs() < 1e-9);
    assert!((distance * 100.0 - 720.0).abs() < 1e-9); // cm
  }

  #[test]
  fn matches_formula_for_default_table() {
    let estimator = DistanceEstimator::default();
    let cases = [
      ("person", 10, 11),
      ("car", 0, 640),
      ("bicycle", 37, 90),
      ("motorcycle", -20, 5),
      ("bus", 300, 1200),
      ("truck", 1, 2),
      ("dog", 100, 180),
    ];
    for (class_name, x1, x2) in cases {
      let expected = estimator.calibration().width_for(class_name) * 800.0 / f64::from(x2 - x1);
      let distance = estimator.estimate(class_name, x1, x2).unwrap();
      assert!((distance - expected).abs() < 1e-9, "{class_name}");
      assert!(distance > 0.0);
    }
  }

  #[test]
  fn unknown_class_uses_default_width() {
    let estimator = DistanceEstimator::default();
    let distance = estimator.estimate("unknown_class", 100, 200).unwrap();
    assert_eq!(distance, 0.5 * 800.0 / 100.0);
  }

  #[test]
  fn default_width_is_configurable() {
    let calibration = Calibration::new(HashMap::new(), 800.0, 2.0).unwrap();
    let estimator = DistanceEstimator::new(calibration);
    assert_eq!(estimator.estimate("tram", 0, 400).unwrap(), 4.0);
  }

  #[test]
  fn zero_width_box_is_rejected() {
    let estimator = DistanceEstimator::default();
    assert_eq!(
      estimator.estimate("car", 120, 120),
      Err(DistanceError::DegenerateBox { x1: 120, x2: 120 })
    );
  }

  #[test]
  fn inverted_box_is_rejected() {
    let estimator = DistanceEstimator::default();
    assert!(matches!(
      estimator.estimate("car", 200, 100),
      Err(DistanceError::DegenerateBox { .. })
    ));
  }

  #[test]
  fn float_bbox_is_truncated_to_pixels() {
    let estimator = DistanceEstimator::default();
    let distance = estimator
      .estimate_bbox("person", &[100.9, 5.0, 200.2, 50.0])
      .unwrap();
    assert_eq!(distance, 4.0);
    assert!(estimator.estimate_bbox("person", &[10.2, 0.0, 10.8, 1.0]).is_err());
  }

  #[test]
  fn invalid_calibration_is_rejected() {
    assert!(Calibration::new(HashMap::new(), 0.0, 0.5).is_err());
    assert!(Calibration::new(HashMap::new(), 800.0, -1.0).is_err());
    assert!(Calibration::new(HashMap::new(), f64::NAN, 0.5).is_err());
    let widths = HashMap::from([("car".to_string(), 0.0)]);
    assert!(matches!(
      Calibration::new(widths, 800.0, 0.5),
      Err(DistanceError::InvalidCalibration { name, .. }) if name == "known_widths.car"
    ));
  }
}
