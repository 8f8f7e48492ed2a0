// 该文件是 TramCV（电车视距）项目的一部分。
// src/input.rs - 视频/图像输入
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::VideoFrame};

mod read_image_file;
pub use self::read_image_file::{ImageFileFrames, ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerFrames, GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("不支持的输入方案: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的帧来源
pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    if url.scheme() == ImageFileInput::SCHEME {
      let input = ImageFileInput::from_url(url)?;
      return Ok(InputWrapper::ReadImageFile(input));
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl InputWrapper {
  pub fn width(&self) -> u32 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.width(),
      InputWrapper::ReadImageFile(input) => input.width(),
    }
  }

  pub fn height(&self) -> u32 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.height(),
      InputWrapper::ReadImageFile(input) => input.height(),
    }
  }

  /// 帧率，以 (分子, 分母) 表示
  pub fn fps(&self) -> (i32, i32) {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.fps(),
      InputWrapper::ReadImageFile(input) => input.fps(),
    }
  }

  /// 按值消费来源，得到只能前进一次的帧序列
  pub fn into_frames(self) -> InputFrames {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => InputFrames::GStreamerInput(input.into_frames()),
      InputWrapper::ReadImageFile(input) => InputFrames::ReadImageFile(input.into_frames()),
    }
  }
}

pub enum InputFrames {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerFrames),
  ReadImageFile(ImageFileFrames),
}

impl Iterator for InputFrames {
  type Item = Result<VideoFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputFrames::GStreamerInput(frames) => frames.next().map(|r| r.map_err(InputError::from)),
      InputFrames::ReadImageFile(frames) => frames.next().map(|r| r.map_err(InputError::from)),
    }
  }
}
