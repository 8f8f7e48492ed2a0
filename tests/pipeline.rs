// 该文件是 TramCV（电车视距）项目的一部分。
// tests/pipeline.rs - 帧处理流程端到端测试
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

use std::convert::Infallible;

use image::{Rgb, RgbImage};
use url::Url;

use tramcv::{
  FromUrl,
  frame::VideoFrame,
  model::{DetectItem, DetectResult, Model, Speed},
  output::{OutputWrapper, draw::Draw},
  task::{ContinuousTask, Task},
};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

/// 每帧返回一个固定的行人框，耗时可配置
struct StubDetector {
  frame_ms: f64,
}

impl Model for StubDetector {
  type Input = VideoFrame;
  type Output = DetectResult;
  type Error = Infallible;

  fn infer(&self, input: &VideoFrame) -> Result<DetectResult, Infallible> {
    let offset = (input.index % 10) as f32;
    Ok(DetectResult {
      items: vec![DetectItem {
        class_id: 0,
        label: "person".to_string(),
        score: 0.8,
        bbox: [20.0 + offset, 30.0, 60.0 + offset, 100.0],
      }]
      .into_boxed_slice(),
      speed: Speed {
        preprocess: 1.0,
        inference: self.frame_ms,
        postprocess: 1.0,
      },
    })
  }
}

fn noise_frames(n: u64) -> impl Iterator<Item = Result<VideoFrame, Infallible>> {
  (0..n).map(|index| {
    let mut state = index.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let image = RgbImage::from_fn(WIDTH, HEIGHT, |_, _| {
      state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
      let bytes = (state >> 40).to_le_bytes();
      Rgb([bytes[0], bytes[1], bytes[2]])
    });
    Ok(VideoFrame::new(index, image))
  })
}

fn folder_output(dir: &std::path::Path, query: &str) -> OutputWrapper {
  let url = Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
  OutputWrapper::from_url(&url).unwrap()
}

fn png_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
  let mut files: Vec<_> = std::fs::read_dir(dir)
    .unwrap()
    .map(|entry| entry.unwrap().path())
    .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
    .collect();
  files.sort();
  files
}

#[test]
fn synthetic_sequence_produces_one_output_frame_per_input() {
  const N: u64 = 12;
  let dir = tempfile::tempdir().unwrap();

  let summary = ContinuousTask::new(Draw::default())
    .run_task(
      noise_frames(N),
      StubDetector { frame_ms: 20.0 },
      folder_output(dir.path(), ""),
    )
    .unwrap();

  assert_eq!(summary.frames, N);
  assert_eq!(summary.detections, N as usize);

  let files = png_files(dir.path());
  assert_eq!(files.len(), N as usize);
  for (index, path) in files.iter().enumerate() {
    assert_eq!(
      path.file_name().unwrap().to_str().unwrap(),
      format!("frame-{:06}.png", index)
    );
    assert!(std::fs::metadata(path).unwrap().len() > 0);
    let image = image::open(path).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (WIDTH, HEIGHT));
  }
}

#[test]
fn annotated_frames_carry_the_box() {
  let dir = tempfile::tempdir().unwrap();
  ContinuousTask::new(Draw::default())
    .run_task(
      noise_frames(1),
      StubDetector { frame_ms: 20.0 },
      folder_output(dir.path(), ""),
    )
    .unwrap();

  let image = image::open(dir.path().join("frame-000000.png"))
    .unwrap()
    .to_rgb8();
  assert_eq!(*image.get_pixel(20, 30), Rgb([255, 255, 255]));
  assert_eq!(*image.get_pixel(60, 100), Rgb([255, 255, 255]));
  assert_eq!(*image.get_pixel(40, 100), Rgb([255, 255, 255]));
}

#[test]
fn record_output_logs_distance_per_frame() {
  let dir = tempfile::tempdir().unwrap();
  ContinuousTask::new(Draw::default())
    .with_max_frames(3)
    .run_task(
      noise_frames(10),
      StubDetector { frame_ms: 150.0 },
      folder_output(dir.path(), "?record"),
    )
    .unwrap();

  assert_eq!(png_files(dir.path()).len(), 3);
  // 行人宽 0.5 m，框宽 40 px，焦距 800 px -> 10 m
  let record = std::fs::read_to_string(dir.path().join("frame-000001.txt")).unwrap();
  assert_eq!(record, "person, 0.8000, 21.0, 30.0, 61.0, 100.0, 10.0000");
}
