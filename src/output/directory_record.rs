// 该文件是 TramCV（电车视距）项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::VideoFrame,
  model::DetectResult,
  output::{Render, draw::Draw},
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 将标注后的帧逐张保存为 PNG
///
/// URL：`folder://<目录>`，追加 `?record` 时同时为每帧写一份 `.txt` 检测记录。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  frames_written: u64,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    // `folder://out` 这类相对写法会把目录名解析成主机名
    let path = url_path(uri);
    let directory = match uri.host_str() {
      Some(host) if !host.is_empty() => PathBuf::from(host).join(path.trim_start_matches('/')),
      _ => PathBuf::from(path),
    };
    std::fs::create_dir_all(&directory)?;
    info!("Recording frames to {}", directory.display());

    Ok(DirectoryRecordOutput {
      directory,
      record,
      frames_written: 0,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn frames_written(&self) -> u64 {
    self.frames_written
  }

  fn frame_path(&self, index: u64) -> PathBuf {
    self.directory.join(format!("frame-{:06}.png", index))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &mut self,
    draw: &Draw,
    mut frame: VideoFrame,
    result: &DetectResult,
  ) -> Result<(), Self::Error> {
    let path = self.frame_path(frame.index);
    draw.annotate(&mut frame.image, result);
    frame.image.save(&path)?;
    if self.record {
      std::fs::write(path.with_extension("txt"), draw.record_lines(result))?;
    }
    self.frames_written += 1;
    Ok(())
  }

  fn finish(self) -> Result<(), Self::Error> {
    info!(
      "Directory output closed. Total frames written: {}",
      self.frames_written
    );
    Ok(())
  }
}
