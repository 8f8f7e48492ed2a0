// 该文件是 TramCV（电车视距）项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频输入
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

//! # GStreamer 视频输入模块
//!
//! 用 GStreamer 解码视频文件，逐帧产出 RGB [`VideoFrame`]。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-libav
//! ```
//!
//! ## URL
//!
//! `gst://file/<绝对路径>`，例如 `gst://file/data/tram.mp4`。
//!
//! 分辨率与帧率取自第一帧解码结果，不需要预先指定。
//! 文件来源不丢帧（`appsink sync=false`，不设置 `drop`），解码速度跟随处理速度。

use std::collections::HashMap;

use crate::{FromUrl, FromUrlWithScheme, frame::VideoFrame, url_path};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// 容器未声明帧率（可变帧率）时使用的帧率
const FALLBACK_FPS: (i32, i32) = (30, 1);
const PULL_INTERVAL: gst::ClockTime = gst::ClockTime::from_mseconds(100);

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI 方案或主机不匹配（期望 `gst://file/...`）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: {width}x{height} with stride {stride}, got {actual} bytes")]
  BufferSizeMismatch {
    width: u32,
    height: u32,
    stride: usize,
    actual: usize,
  },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 未解码出任何帧即结束
  #[error("Video source produced no frames")]
  EmptySource,
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  TargetFormat { format: String },
  VideoFlip { method: u32 },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerInputPipelineBuilder {
  pub fn file(path: &str) -> Self {
    Self {
      items: vec![GStreamerInputBuilderItem::FileSource(path.to_string())],
    }
  }

  /// 旋转角度（90/180/270），其他值忽略
  pub fn rotate(mut self, degrees: &str) -> Self {
    let method = match degrees {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return self,
    };
    self
      .items
      .push(GStreamerInputBuilderItem::VideoFlip { method });
    self
  }

  pub fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .chain(std::iter::once(
        GStreamerInputBuilderItem::TargetFormat {
          format: "RGB".to_string(),
        }
        .to_pipeline(),
      ))
      .collect::<Vec<String>>()
      .join(" ! ");
    format!("{} ! appsink name=sink sync=false", basic_pipeline)
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.description();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    let mut input = GStreamerInput {
      pipeline,
      appsink,
      pending: None,
      video_info: None,
    };

    // 先取第一帧，拿到分辨率与帧率
    let first = input.pull()?.ok_or(GStreamerInputError::EmptySource)?;
    let caps = first
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
    info!(
      "Video source opened: {}x{} @ {}/{} fps",
      video_info.width(),
      video_info.height(),
      video_info.fps().numer(),
      video_info.fps().denom()
    );
    input.video_info = Some(video_info);
    input.pending = Some(first);

    Ok(input)
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME || url.host_str() != Some("file") {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut builder = Self::file(&url_path(url));
    if let Some(degrees) = query.get("rotate") {
      builder = builder.rotate(degrees);
    }
    Ok(builder)
  }
}

/// GStreamer 视频输入
///
/// 管理管道与 appsink。第一帧在构建时已取出并缓存，迭代时首先返回它。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  pending: Option<gst::Sample>,
  video_info: Option<gst_video::VideoInfo>,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  pub fn width(&self) -> u32 {
    self.video_info.as_ref().map(|info| info.width()).unwrap_or(0)
  }

  pub fn height(&self) -> u32 {
    self
      .video_info
      .as_ref()
      .map(|info| info.height())
      .unwrap_or(0)
  }

  pub fn fps(&self) -> (i32, i32) {
    match self.video_info.as_ref().map(|info| info.fps()) {
      Some(fps) if fps.numer() > 0 && fps.denom() > 0 => (fps.numer(), fps.denom()),
      _ => FALLBACK_FPS,
    }
  }

  pub fn into_frames(self) -> GStreamerFrames {
    GStreamerFrames {
      inner: self,
      index: 0,
      finished: false,
    }
  }

  /// 拉取下一帧；流结束返回 `Ok(None)`，管道报错返回错误
  ///
  /// 解码线程出错时 appsink 收不到 EOS，所以按间隔轮询总线。
  fn pull(&self) -> Result<Option<gst::Sample>, GStreamerInputError> {
    loop {
      if let Some(sample) = self.appsink.try_pull_sample(PULL_INTERVAL) {
        return Ok(Some(sample));
      }
      if let Some(error) = self.bus_error() {
        return Err(error);
      }
      if self.appsink.is_eos() {
        debug!("GStreamer source reached end of stream");
        return Ok(None);
      }
    }
  }

  fn bus_error(&self) -> Option<GStreamerInputError> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(GStreamerInputError::PipelineError(format!(
        "{} ({})",
        err.error(),
        err.debug().map(|d| d.to_string()).unwrap_or_default()
      ))),
      _ => None,
    }
  }
}

/// GStreamer 输入的帧迭代器
///
/// 出错后不再产出任何帧。
pub struct GStreamerFrames {
  inner: GStreamerInput,
  index: u64,
  finished: bool,
}

impl Iterator for GStreamerFrames {
  type Item = Result<VideoFrame, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let sample = match self.inner.pending.take() {
      Some(sample) => Ok(Some(sample)),
      None => self.inner.pull(),
    };

    let result = match sample {
      Ok(Some(sample)) => convert_sample(self.index, &sample),
      Ok(None) => {
        self.finished = true;
        return None;
      }
      Err(e) => Err(e),
    };

    match &result {
      Ok(_) => self.index += 1,
      Err(_) => self.finished = true,
    }
    Some(result)
  }
}

fn convert_sample(index: u64, sample: &gst::Sample) -> Result<VideoFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat(video_info.format()));
  }

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let frame = VideoFrame::from_strided(index, width, height, stride, data).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      width,
      height,
      stride,
      actual: data.len(),
    },
  )?;

  Ok(frame.with_timestamp_ms(buffer.pts().map(|pts| pts.mseconds())))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_url_builds_decode_pipeline() {
    let url = Url::parse("gst://file/data/tram%20ride.mp4").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.description(),
      "filesrc location=\"/data/tram ride.mp4\" ! decodebin ! videoconvert ! \
       video/x-raw,format=RGB ! appsink name=sink sync=false"
    );
  }

  #[test]
  fn rotation_adds_videoflip() {
    let url = Url::parse("gst://file/data/tram.mp4?rotate=180").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert!(builder.description().contains("decodebin ! videoflip method=2 ! videoconvert"));
  }

  #[test]
  fn non_file_host_is_rejected() {
    let url = Url::parse("gst://camera/dev/video0").unwrap();
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&url),
      Err(GStreamerInputError::SchemeMismatch)
    ));
  }
}
