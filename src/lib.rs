// 该文件是 TramCV（电车视距）项目的一部分。
// src/lib.rs - 库主文件
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

pub mod config;
pub mod distance;
pub mod frame;
pub mod input;
pub mod model;
pub mod monitor;
pub mod output;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 将命令行给出的来源解析为 URL
///
/// 已带方案的字符串（如 `gst://file/video.mp4`）原样解析；
/// 普通文件路径按扩展名映射：图片映射到 `image://`，其余映射到 `gst://file`。
pub fn source_to_url(source: &str) -> Result<url::Url, url::ParseError> {
  if source.contains("://") {
    return url::Url::parse(source);
  }
  let path = absolute_path(source);
  if has_image_extension(&path) {
    url::Url::parse(&format!("image://{}", path))
  } else {
    url::Url::parse(&format!("gst://file{}", path))
  }
}

/// 将输出路径解析为 URL，普通路径映射到 `gst://` 视频编码输出
pub fn sink_to_url(sink: &str) -> Result<url::Url, url::ParseError> {
  if sink.contains("://") {
    return url::Url::parse(sink);
  }
  url::Url::parse(&format!("gst://{}", absolute_path(sink)))
}

/// 解码 URL 中的路径部分（处理空格等转义字符）
pub fn url_path(url: &url::Url) -> String {
  urlencoding::decode(url.path())
    .map(|p| p.into_owned())
    .unwrap_or_else(|_| url.path().to_string())
}

fn absolute_path(path: &str) -> String {
  let path = std::path::Path::new(path);
  let absolute = if path.is_absolute() {
    path.to_path_buf()
  } else {
    std::env::current_dir()
      .map(|cwd| cwd.join(path))
      .unwrap_or_else(|_| path.to_path_buf())
  };
  let text = absolute.to_string_lossy().replace('\\', "/");
  let text = if text.starts_with('/') {
    text
  } else {
    format!("/{}", text)
  };
  urlencoding::encode(&text).replace("%2F", "/")
}

fn has_image_extension(path: &str) -> bool {
  const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];
  std::path::Path::new(path)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_video_path_maps_to_gstreamer_file_source() {
    let url = source_to_url("/data/tram ride.mp4").unwrap();
    assert_eq!(url.scheme(), "gst");
    assert_eq!(url.host_str(), Some("file"));
    assert_eq!(url_path(&url), "/data/tram ride.mp4");
  }

  #[test]
  fn plain_image_path_maps_to_image_source() {
    let url = source_to_url("/data/still.JPG").unwrap();
    assert_eq!(url.scheme(), "image");
    assert_eq!(url_path(&url), "/data/still.JPG");
  }

  #[test]
  fn explicit_scheme_is_kept() {
    let url = source_to_url("folder:///tmp/out?record").unwrap();
    assert_eq!(url.scheme(), "folder");
    assert_eq!(url.path(), "/tmp/out");
  }

  #[test]
  fn plain_output_path_maps_to_gstreamer_sink() {
    let url = sink_to_url("/videos/detected_output.avi").unwrap();
    assert_eq!(url.scheme(), "gst");
    assert_eq!(url_path(&url), "/videos/detected_output.avi");
  }
}
