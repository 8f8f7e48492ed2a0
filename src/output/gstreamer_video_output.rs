// 该文件是 TramCV（电车视距）项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的帧编码为视频文件，编码管道按扩展名选择：
//!
//! - **AVI** (H.264) - 默认输出 `detected_output.avi`
//! - **MP4** (H.264)
//! - **MKV** (H.264, Matroska)
//! - **WebM** (VP8)
//!
//! ## URL
//!
//! `gst://<绝对路径>[?fps=<分子>/<分母>]`，例如 `gst:///videos/out.avi?fps=30000/1001`。
//!
//! 分辨率取自第一帧，帧率取自 `fps` 参数（缺省 30/1）。
//! 时间戳由帧序号和帧率计算。

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::VideoFrame,
  model::DetectResult,
  output::{Render, draw::Draw},
  url_path,
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

const DEFAULT_FPS: (i32, i32) = (30, 1);
/// Drop 时等待编码器收尾的上限
const DROP_EOS_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(5);

#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 帧尺寸与第一帧不同
  #[error("Frame size changed from {expected:?} to {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("Invalid frame rate: {0}")]
  InvalidFrameRate(String),
}

/// 按扩展名选择编码管道
pub fn pipeline_description(file_path: &str) -> String {
  let extension = std::path::Path::new(file_path)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| ext.to_ascii_lowercase())
    .unwrap_or_default();

  let encoder = match extension.as_str() {
    "mp4" => {
      "video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
    }
    "mkv" => "video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux",
    "webm" => "vp8enc ! webmmux",
    _ => "video/x-raw,format=I420 ! x264enc speed-preset=fast ! avimux",
  };

  format!(
    "appsrc name=src ! videoconvert ! {} ! filesink location=\"{}\"",
    encoder, file_path
  )
}

/// 解析 `30`、`30/1`、`30000/1001` 形式的帧率
pub fn parse_fps(text: &str) -> Result<(i32, i32), GStreamerVideoOutputError> {
  let invalid = || GStreamerVideoOutputError::InvalidFrameRate(text.to_string());
  let (numer, denom) = match text.split_once('/') {
    Some((n, d)) => (n.trim().parse::<i32>(), d.trim().parse::<i32>()),
    None => (text.trim().parse::<i32>(), Ok(1)),
  };
  match (numer, denom) {
    (Ok(n), Ok(d)) if n > 0 && d > 0 => Ok((n, d)),
    _ => Err(invalid()),
  }
}

/// 第 `index` 帧的显示时间戳与时长（纳秒）
///
/// 用 `u128` 计算中间值，超出 `u64` 时饱和。
pub fn frame_timing(index: u64, fps: (i32, i32)) -> (u64, u64) {
  let numer = u128::from(fps.0.max(1).unsigned_abs());
  let denom = u128::from(fps.1.max(1).unsigned_abs());
  let at = |i: u128| u64::try_from(i * denom * 1_000_000_000 / numer).unwrap_or(u64::MAX);
  let pts = at(u128::from(index));
  let next = at(u128::from(index) + 1);
  (pts, next - pts)
}

/// GStreamer 视频文件输出
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  file_path: String,
  fps: (i32, i32),
  size: Option<(u32, u32)>,
  frame_count: u64,
  finished: bool,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    gst::init()?;

    let fps = match url.query_pairs().find(|(k, _)| k == "fps") {
      Some((_, v)) => parse_fps(&v)?,
      None => DEFAULT_FPS,
    };

    // `gst://out.avi` 这类相对写法会把文件名解析成主机名
    let file_path = match url.host_str() {
      Some(host) if !host.is_empty() => format!("{}{}", host, url_path(url)),
      _ => url_path(url),
    };

    let pipeline_desc = pipeline_description(&file_path);
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      file_path,
      fps,
      size: None,
      frame_count: 0,
      finished: false,
    })
  }
}

impl GStreamerVideoOutput {
  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  /// 第一帧到来时按其尺寸设置 caps
  fn ensure_caps(&mut self, width: u32, height: u32) -> Result<(), GStreamerVideoOutputError> {
    match self.size {
      Some(size) if size == (width, height) => Ok(()),
      Some(expected) => Err(GStreamerVideoOutputError::FrameSizeChanged {
        expected,
        actual: (width, height),
      }),
      None => {
        let caps = gst::Caps::builder("video/x-raw")
          .field("format", "RGB")
          .field("width", width as i32)
          .field("height", height as i32)
          .field("framerate", gst::Fraction::new(self.fps.0, self.fps.1))
          .build();
        self.appsrc.set_caps(Some(&caps));
        self.size = Some((width, height));
        info!(
          "Video output initialized: {}x{} @ {}/{} fps -> {}",
          width, height, self.fps.0, self.fps.1, self.file_path
        );
        Ok(())
      }
    }
  }

  fn push_frame(&mut self, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let mut buffer = gst::Buffer::from_mut_slice(data.to_vec());
    let (pts, duration) = frame_timing(self.frame_count, self.fps);
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }

  /// 发送 EOS 并等待封装器写完文件
  fn close(&mut self, timeout: Option<gst::ClockTime>) -> Result<(), GStreamerVideoOutputError> {
    if self.finished {
      return Ok(());
    }
    self.finished = true;

    let result = self.wait_for_eos(timeout);
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
    info!(
      "Video output closed. Total frames written: {}",
      self.frame_count
    );
    result
  }

  fn wait_for_eos(&self, timeout: Option<gst::ClockTime>) -> Result<(), GStreamerVideoOutputError> {
    self.appsrc.end_of_stream().map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to send EOS: {:?}", e))
    })?;

    let bus = self
      .pipeline
      .bus()
      .ok_or_else(|| GStreamerVideoOutputError::PipelineError("Pipeline has no bus".to_string()))?;
    let message = bus.timed_pop_filtered(timeout, &[gst::MessageType::Eos, gst::MessageType::Error]);

    match message.as_ref().map(|m| m.view()) {
      Some(gst::MessageView::Eos(_)) => Ok(()),
      Some(gst::MessageView::Error(err)) => Err(GStreamerVideoOutputError::PipelineError(format!(
        "{} ({})",
        err.error(),
        err.debug().map(|d| d.to_string()).unwrap_or_default()
      ))),
      _ => Err(GStreamerVideoOutputError::PipelineError(
        "Timed out waiting for end of stream".to_string(),
      )),
    }
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Err(e) = self.close(Some(DROP_EOS_TIMEOUT)) {
      warn!("Video output was not finalized cleanly: {}", e);
    }
  }
}

impl Render for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(
    &mut self,
    draw: &Draw,
    mut frame: VideoFrame,
    result: &DetectResult,
  ) -> Result<(), Self::Error> {
    self.ensure_caps(frame.image.width(), frame.image.height())?;
    draw.annotate(&mut frame.image, result);
    self.push_frame(frame.image.as_raw())
  }

  fn finish(mut self) -> Result<(), Self::Error> {
    self.close(None)
  }
}
