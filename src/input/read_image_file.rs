// 该文件是 TramCV（电车视距）项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use crate::{FromUrl, FromUrlWithScheme, frame::VideoFrame, url_path};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张静态图像，作为只有一帧的来源
pub struct ImageFileInput {
  image: RgbImage,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let path = url_path(url);
    let image = ImageReader::open(&path)?.with_guessed_format()?.decode()?;
    let image = image.to_rgb8();
    info!("Loaded image {} ({}x{})", path, image.width(), image.height());

    Ok(ImageFileInput { image })
  }
}

impl ImageFileInput {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn fps(&self) -> (i32, i32) {
    (1, 1)
  }

  pub fn into_frames(self) -> ImageFileFrames {
    ImageFileFrames {
      image: Some(self.image),
    }
  }
}

pub struct ImageFileFrames {
  image: Option<RgbImage>,
}

impl Iterator for ImageFileFrames {
  type Item = Result<VideoFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self
      .image
      .take()
      .map(|image| Ok(VideoFrame::new(0, image).with_timestamp_ms(Some(0))))
  }
}
