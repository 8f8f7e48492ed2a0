// 该文件是 TramCV（电车视距）项目的一部分。
// tests/video_roundtrip.rs - 视频编码输出回读测试
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

//! 需要 GStreamer 及 x264/avimux 插件，默认不运行：
//! `cargo test --test video_roundtrip -- --ignored`

#![cfg(all(feature = "gstreamer_input", feature = "gstreamer_output"))]

use std::convert::Infallible;

use image::{Rgb, RgbImage};

use tramcv::{
  FromUrl,
  frame::VideoFrame,
  input::InputWrapper,
  model::{DetectItem, DetectResult, Model, Speed},
  output::{OutputWrapper, draw::Draw},
  sink_to_url, source_to_url,
  task::{ContinuousTask, Task},
};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

struct StubDetector;

impl Model for StubDetector {
  type Input = VideoFrame;
  type Output = DetectResult;
  type Error = Infallible;

  fn infer(&self, _input: &VideoFrame) -> Result<DetectResult, Infallible> {
    Ok(DetectResult {
      items: vec![DetectItem {
        class_id: 2,
        label: "car".to_string(),
        score: 0.9,
        bbox: [40.0, 40.0, 120.0, 100.0],
      }]
      .into_boxed_slice(),
      speed: Speed {
        preprocess: 1.0,
        inference: 150.0,
        postprocess: 1.0,
      },
    })
  }
}

fn gradient_frames(n: u64) -> impl Iterator<Item = Result<VideoFrame, Infallible>> {
  (0..n).map(|index| {
    let shade = (index * 16 % 256) as u8;
    let image = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| Rgb([x as u8, y as u8, shade]));
    Ok(VideoFrame::new(index, image))
  })
}

#[test]
#[ignore = "needs GStreamer plugins"]
fn encoded_video_has_one_frame_per_input() {
  const N: u64 = 15;
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("detected_output.avi");
  let path_text = path.to_str().unwrap();

  let sink = sink_to_url(&format!("gst://{}?fps=15/1", path_text)).unwrap();
  let output = OutputWrapper::from_url(&sink).unwrap();
  let summary = ContinuousTask::new(Draw::default())
    .run_task(gradient_frames(N), StubDetector, output)
    .unwrap();
  assert_eq!(summary.frames, N);

  assert!(std::fs::metadata(&path).unwrap().len() > 0);

  let source = source_to_url(path_text).unwrap();
  let input = InputWrapper::from_url(&source).unwrap();
  assert_eq!((input.width(), input.height()), (WIDTH, HEIGHT));
  assert_eq!(input.fps(), (15, 1));

  let frames = input
    .into_frames()
    .collect::<Result<Vec<_>, _>>()
    .unwrap();
  assert_eq!(frames.len(), N as usize);
}
