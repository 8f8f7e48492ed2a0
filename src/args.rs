// 该文件是 TramCV（电车视距）项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;

/// 电车前视障碍物检测与测距
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入视频
  /// 支持格式:
  /// - 视频文件: *.mp4, *.avi, *.mkv 等，或 gst://file/<路径>
  /// - 图片: *.jpg, *.jpeg, *.png, *.bmp, *.gif, *.webp，或 image://<路径>
  #[arg(long, value_name = "SOURCE")]
  pub source: String,

  /// 输出调试日志
  #[arg(long)]
  pub verbose: bool,

  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// ONNX 模型文件路径（覆盖配置文件）
  #[arg(long, value_name = "FILE")]
  pub model: Option<PathBuf>,

  /// 输出路径（覆盖配置文件，默认 detected_output.avi）
  /// 支持格式:
  /// - 视频: *.avi, *.mp4, *.mkv, *.webm
  /// - 目录: folder://<目录>[?record]
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<String>,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_is_required() {
    assert!(Args::try_parse_from(["tramcv"]).is_err());
  }

  #[test]
  fn defaults_and_overrides() {
    let args = Args::try_parse_from(["tramcv", "--source", "ride.mp4"]).unwrap();
    assert_eq!(args.source, "ride.mp4");
    assert!(!args.verbose);
    assert_eq!(args.max_frames, 0);
    assert!(args.output.is_none());

    let args = Args::try_parse_from([
      "tramcv",
      "--source",
      "ride.mp4",
      "--verbose",
      "--model",
      "yolo11n.onnx",
      "--output",
      "out.mp4",
      "--max-frames",
      "25",
    ])
    .unwrap();
    assert!(args.verbose);
    assert_eq!(args.model, Some(PathBuf::from("yolo11n.onnx")));
    assert_eq!(args.output.as_deref(), Some("out.mp4"));
    assert_eq!(args.max_frames, 25);
  }
}
