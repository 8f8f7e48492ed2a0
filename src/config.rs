// 该文件是 TramCV（电车视距）项目的一部分。
// src/config.rs - 配置文件
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

//! # 配置
//!
//! 所有字段均可省略，缺省值与车载系统出厂设置一致：
//!
//! ```toml
//! [model]
//! path = "yolo11n.onnx"
//! input_size = 320
//!
//! [distance]
//! focal_length = 800.0
//! default_width = 0.5
//! [distance.known_widths]
//! person = 0.5
//! car = 1.8
//!
//! [overlay]
//! warn_threshold_ms = 100.0
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::distance::{Calibration, DistanceError};

const DEFAULT_MODEL_PATH: &str = "yolo11n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 320;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_WARN_THRESHOLD_MS: f64 = 100.0;
const DEFAULT_OUTPUT_PATH: &str = "detected_output.avi";
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("解析配置文件失败: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("标定参数无效: {0}")]
  Calibration(#[from] DistanceError),
  #[error("配置项 {field} 无效: {reason}")]
  Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
  model: Option<ModelFile>,
  distance: Option<DistanceFile>,
  overlay: Option<OverlayFile>,
  output: Option<OutputFile>,
  monitor: Option<MonitorFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelFile {
  path: Option<PathBuf>,
  input_size: Option<u32>,
  confidence: Option<f32>,
  iou: Option<f32>,
  labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DistanceFile {
  focal_length: Option<f64>,
  default_width: Option<f64>,
  known_widths: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlayFile {
  warn_threshold_ms: Option<f64>,
  font: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputFile {
  path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorFile {
  log_interval_secs: Option<u64>,
}

/// 检测模型设置
#[derive(Debug, Clone)]
pub struct ModelSettings {
  pub path: PathBuf,
  /// 推理分辨率（正方形边长，像素）
  pub input_size: u32,
  pub confidence: f32,
  pub iou: f32,
  /// 覆盖默认 COCO 类别表
  pub labels: Option<Vec<String>>,
}

/// 叠加层设置
#[derive(Debug, Clone)]
pub struct OverlaySettings {
  /// 单帧耗时超过该值时显示性能告警
  pub warn_threshold_ms: f64,
  /// 为空时用内嵌字体
  pub font: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
  pub model: ModelSettings,
  pub calibration: Calibration,
  pub overlay: OverlaySettings,
  pub output: String,
  pub monitor_interval: Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Settings {
      model: ModelSettings {
        path: PathBuf::from(DEFAULT_MODEL_PATH),
        input_size: DEFAULT_INPUT_SIZE,
        confidence: DEFAULT_CONFIDENCE,
        iou: DEFAULT_IOU,
        labels: None,
      },
      calibration: Calibration::default(),
      overlay: OverlaySettings {
        warn_threshold_ms: DEFAULT_WARN_THRESHOLD_MS,
        font: None,
      },
      output: DEFAULT_OUTPUT_PATH.to_string(),
      monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
    }
  }
}

impl Settings {
  /// 加载配置；未给出路径时使用缺省值
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let file = match path {
      Some(path) => {
        info!("加载配置文件: {}", path.display());
        read_settings_file(path)?
      }
      None => {
        debug!("未指定配置文件，使用缺省配置");
        SettingsFile::default()
      }
    };
    Self::from_file(file)
  }

  pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
    let file: SettingsFile = toml::from_str(text)?;
    Self::from_file(file)
  }

  fn from_file(file: SettingsFile) -> Result<Self, ConfigError> {
    let model_file = file.model.unwrap_or_default();
    let model = ModelSettings {
      path: model_file
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
      input_size: model_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
      confidence: model_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
      iou: model_file.iou.unwrap_or(DEFAULT_IOU),
      labels: model_file.labels,
    };

    let distance_file = file.distance.unwrap_or_default();
    let defaults = Calibration::default();
    let calibration = Calibration::new(
      distance_file
        .known_widths
        .unwrap_or_else(|| defaults.known_widths().clone()),
      distance_file
        .focal_length
        .unwrap_or_else(|| defaults.focal_length()),
      distance_file
        .default_width
        .unwrap_or_else(|| defaults.default_width()),
    )?;

    let overlay_file = file.overlay.unwrap_or_default();
    let overlay = OverlaySettings {
      warn_threshold_ms: overlay_file
        .warn_threshold_ms
        .unwrap_or(DEFAULT_WARN_THRESHOLD_MS),
      font: overlay_file.font,
    };

    let output = file
      .output
      .and_then(|output| output.path)
      .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string());

    let monitor_interval = Duration::from_secs(
      file
        .monitor
        .and_then(|monitor| monitor.log_interval_secs)
        .unwrap_or(DEFAULT_MONITOR_INTERVAL_SECS),
    );

    let settings = Settings {
      model,
      calibration,
      overlay,
      output,
      monitor_interval,
    };
    settings.validate()?;
    Ok(settings)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
      return Err(ConfigError::Invalid {
        field: "model.input_size",
        reason: format!("{} 不是 32 的正整数倍", self.model.input_size),
      });
    }
    if !(0.0..=1.0).contains(&self.model.confidence) {
      return Err(ConfigError::Invalid {
        field: "model.confidence",
        reason: format!("{} 不在 0.0 - 1.0 之间", self.model.confidence),
      });
    }
    if !(0.0..=1.0).contains(&self.model.iou) {
      return Err(ConfigError::Invalid {
        field: "model.iou",
        reason: format!("{} 不在 0.0 - 1.0 之间", self.model.iou),
      });
    }
    if let Some(labels) = &self.model.labels
      && labels.is_empty()
    {
      return Err(ConfigError::Invalid {
        field: "model.labels",
        reason: "类别表为空".to_string(),
      });
    }
    if !self.overlay.warn_threshold_ms.is_finite() || self.overlay.warn_threshold_ms < 0.0 {
      return Err(ConfigError::Invalid {
        field: "overlay.warn_threshold_ms",
        reason: format!("{}", self.overlay.warn_threshold_ms),
      });
    }
    if self.output.is_empty() {
      return Err(ConfigError::Invalid {
        field: "output.path",
        reason: "输出路径为空".to_string(),
      });
    }
    Ok(())
  }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(toml::from_str(&text)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_factory_settings() {
    let settings = Settings::default();
    assert_eq!(settings.model.path, PathBuf::from("yolo11n.onnx"));
    assert_eq!(settings.model.input_size, 320);
    assert_eq!(settings.calibration.focal_length(), 800.0);
    assert_eq!(settings.calibration.default_width(), 0.5);
    assert_eq!(settings.calibration.width_for("car"), 1.8);
    assert_eq!(settings.calibration.width_for("bus"), 2.5);
    assert_eq!(settings.overlay.warn_threshold_ms, 100.0);
    assert_eq!(settings.output, "detected_output.avi");
    assert_eq!(settings.monitor_interval, Duration::from_secs(5));
  }

  #[test]
  fn partial_file_fills_in_defaults() {
    let settings = Settings::from_toml(
      r#"
      [distance]
      focal_length = 1000.0

      [overlay]
      warn_threshold_ms = 40.0
      "#,
    )
    .unwrap();
    assert_eq!(settings.calibration.focal_length(), 1000.0);
    assert_eq!(settings.calibration.width_for("truck"), 2.2);
    assert_eq!(settings.overlay.warn_threshold_ms, 40.0);
    assert_eq!(settings.model.input_size, 320);
  }

  #[test]
  fn known_widths_table_replaces_defaults() {
    let settings = Settings::from_toml(
      r#"
      [distance]
      default_width = 1.0
      [distance.known_widths]
      tram = 2.65
      "#,
    )
    .unwrap();
    assert_eq!(settings.calibration.width_for("tram"), 2.65);
    // 不再包含默认表中的类别
    assert_eq!(settings.calibration.width_for("car"), 1.0);
  }

  #[test]
  fn rejects_non_positive_focal_length() {
    let err = Settings::from_toml("[distance]\nfocal_length = 0.0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Calibration(_)));
  }

  #[test]
  fn rejects_input_size_not_multiple_of_32() {
    let err = Settings::from_toml("[model]\ninput_size = 300\n").unwrap_err();
    assert!(matches!(
      err,
      ConfigError::Invalid {
        field: "model.input_size",
        ..
      }
    ));
  }

  #[test]
  fn rejects_unknown_keys() {
    let err = Settings::from_toml("[distance]\nalert_distance = 10.0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
  }

  #[test]
  fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tramcv.toml");
    std::fs::write(&path, "[output]\npath = \"run.mkv\"\n").unwrap();
    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.output, "run.mkv");
  }

  #[test]
  fn missing_file_is_io_error() {
    let err = Settings::load(Some(Path::new("/nonexistent/tramcv.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
  }
}
