// 该文件是 TramCV（电车视距）项目的一部分。
// src/frame.rs - 视频帧定义
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

use image::RgbImage;

pub const RGB_CHANNELS: usize = 3;

/// 以 NHWC（行优先、RGB 交错）布局访问像素
pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
  fn width(&self) -> u32;
  fn height(&self) -> u32;
}

/// 一帧 RGB 图像
///
/// 由输入源产生，叠加层原地修改，最后交给输出写入。
#[derive(Debug, Clone)]
pub struct VideoFrame {
  /// 帧序号，从 0 开始
  pub index: u64,
  /// 解码器给出的显示时间戳（毫秒）
  pub timestamp_ms: Option<u64>,
  pub image: RgbImage,
}

impl VideoFrame {
  pub fn new(index: u64, image: RgbImage) -> Self {
    Self {
      index,
      timestamp_ms: None,
      image,
    }
  }

  pub fn with_timestamp_ms(mut self, timestamp_ms: Option<u64>) -> Self {
    self.timestamp_ms = timestamp_ms;
    self
  }

  /// 按行拷贝带行跨距的 RGB 数据（GStreamer 的 RGB 行按 4 字节对齐）
  pub fn from_strided(
    index: u64,
    width: u32,
    height: u32,
    stride: usize,
    data: &[u8],
  ) -> Option<Self> {
    let row_bytes = width as usize * RGB_CHANNELS;
    if stride < row_bytes || height == 0 {
      return None;
    }
    let needed = stride * (height as usize - 1) + row_bytes;
    if data.len() < needed {
      return None;
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
      pixels.extend_from_slice(&row[..row_bytes]);
    }
    RgbImage::from_raw(width, height, pixels).map(|image| Self::new(index, image))
  }
}

impl AsNhwcFrame for VideoFrame {
  fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }

  fn width(&self) -> u32 {
    self.image.width()
  }

  fn height(&self) -> u32 {
    self.image.height()
  }
}

impl AsNhwcFrame for RgbImage {
  fn as_nhwc(&self) -> &[u8] {
    self.as_raw()
  }

  fn width(&self) -> u32 {
    self.dimensions().0
  }

  fn height(&self) -> u32 {
    self.dimensions().1
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strided_rows_drop_padding() {
    // 2x2 RGB，每行 6 字节数据 + 2 字节填充
    let data = [
      1, 2, 3, 4, 5, 6, 0, 0, //
      7, 8, 9, 10, 11, 12, 0, 0,
    ];
    let frame = VideoFrame::from_strided(3, 2, 2, 8, &data).unwrap();
    assert_eq!(frame.index, 3);
    assert_eq!(frame.as_nhwc(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
  }

  #[test]
  fn last_row_may_omit_padding() {
    let data = [1, 2, 3, 0, 4, 5, 6];
    let frame = VideoFrame::from_strided(0, 1, 2, 4, &data).unwrap();
    assert_eq!(frame.as_nhwc(), &[1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn short_buffer_is_rejected() {
    assert!(VideoFrame::from_strided(0, 2, 2, 6, &[0u8; 11]).is_none());
    assert!(VideoFrame::from_strided(0, 2, 2, 4, &[0u8; 16]).is_none());
  }
}
