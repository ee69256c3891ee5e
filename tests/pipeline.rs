// 该文件是 Yanhuo （烟火） 项目的一部分。
// tests/pipeline.rs - 检测流水线集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use rand::{Rng, SeedableRng, rngs::StdRng};
use yanhuo::{
  DetectConfig, DetectError, Detection, DetectionPipeline, FireSmokeLabel, HeadOutput, ImageSize,
  RawTensor, geometry::iou,
};

const LOGIT_095: f32 = 2.944_439;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_test_writer()
    .try_init();
}

fn flat(rows: &[[f32; 7]]) -> RawTensor {
  let data: Vec<f32> = rows.iter().flatten().copied().collect();
  RawTensor::new(data, &[1, rows.len(), 7]).unwrap()
}

fn random_flat(rng: &mut StdRng, n: usize) -> RawTensor {
  let rows: Vec<[f32; 7]> = (0..n)
    .map(|_| {
      [
        rng.gen_range(-50.0..690.0),
        rng.gen_range(-50.0..690.0),
        rng.gen_range(0.0..300.0),
        rng.gen_range(0.0..300.0),
        rng.r#gen::<f32>(),
        rng.r#gen::<f32>(),
        rng.r#gen::<f32>(),
      ]
    })
    .collect();
  flat(&rows)
}

fn random_grid(rng: &mut StdRng, side: usize) -> RawTensor {
  let data: Vec<f32> = (0..21 * side * side)
    .map(|_| rng.gen_range(-6.0..6.0))
    .collect();
  RawTensor::new(data, &[1, 21, side, side]).unwrap()
}

fn assert_invariants(dets: &[Detection], config: &DetectConfig, original: ImageSize) {
  for d in dets {
    assert!(d.bbox.x1 >= 0.0 && d.bbox.y1 >= 0.0, "{:?}", d);
    assert!(d.bbox.x1 < d.bbox.x2 && d.bbox.y1 < d.bbox.y2, "{:?}", d);
    assert!(d.bbox.x2 < original.w() && d.bbox.y2 < original.h(), "{:?}", d);
    assert!(d.confidence > config.confidence_threshold && d.confidence <= 1.0);
    assert!((d.class_id as usize) < config.num_classes);
  }
  for (i, a) in dets.iter().enumerate() {
    for b in &dets[i + 1..] {
      if a.class_id == b.class_id {
        assert!(iou(&a.bbox, &b.bbox) <= config.nms_iou_threshold);
      }
    }
  }
  assert!(dets.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn flat_output_single_fire() {
  init_tracing();
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();
  let tensor = flat(&[
    [320.0, 320.0, 100.0, 100.0, 0.9, 0.8, 0.1],
    [100.0, 100.0, 40.0, 40.0, 0.9, 0.01, 0.01],
  ]);
  let dets = pipeline
    .detect(&[HeadOutput::flat(&tensor)], ImageSize::new(640, 640))
    .unwrap();

  assert_eq!(dets.len(), 1);
  let d = dets[0];
  assert_eq!(d.label::<FireSmokeLabel>(), FireSmokeLabel::Fire);
  assert!((d.confidence - 0.72).abs() < 1e-3);
  assert!((d.bbox.x1 - 270.0).abs() < 1e-3);
  assert!((d.bbox.y1 - 270.0).abs() < 1e-3);
  assert!((d.bbox.x2 - 370.0).abs() < 1e-3);
  assert!((d.bbox.y2 - 370.0).abs() < 1e-3);
}

#[test]
fn grid_output_single_anchor() {
  init_tracing();
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();

  // 20x20 网格（步长 32），第 0 个锚框 116x90，格子 (5, 5)
  let side = 20;
  let spatial = side * side;
  let mut data = vec![-20.0f32; 21 * spatial];
  let cell = 5 * side + 5;
  for c in 0..4 {
    data[c * spatial + cell] = 0.0;
  }
  data[4 * spatial + cell] = LOGIT_095;
  data[5 * spatial + cell] = 20.0;
  let tensor = RawTensor::new(data, &[1, 21, side, side]).unwrap();

  let dets = pipeline
    .detect(&[HeadOutput::grid(&tensor)], ImageSize::new(640, 640))
    .unwrap();

  assert_eq!(dets.len(), 1);
  let d = dets[0];
  assert_eq!(d.class_id, 0);
  assert!((d.confidence - 0.95).abs() < 1e-3);
  assert!((d.bbox.x1 - 118.0).abs() < 1e-3);
  assert!((d.bbox.y1 - 131.0).abs() < 1e-3);
  assert!((d.bbox.x2 - 234.0).abs() < 1e-3);
  assert!((d.bbox.y2 - 221.0).abs() < 1e-3);
}

#[test]
fn overlapping_same_class_boxes_collapse() {
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();
  let shift = 100.0 * 0.3 / 1.7;
  let tensor = flat(&[
    [150.0, 150.0, 100.0, 100.0, 0.9, 1.0, 0.0],
    [150.0 + shift, 150.0, 100.0, 100.0, 0.6, 1.0, 0.0],
  ]);
  let dets = pipeline
    .detect(&[HeadOutput::flat(&tensor)], ImageSize::new(640, 640))
    .unwrap();
  assert_eq!(dets.len(), 1);
  assert!((dets[0].confidence - 0.9).abs() < 1e-6);
}

#[test]
fn overlapping_boxes_of_different_classes_both_survive() {
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();
  let tensor = flat(&[
    [150.0, 150.0, 100.0, 100.0, 0.9, 1.0, 0.0],
    [155.0, 150.0, 100.0, 100.0, 0.6, 0.0, 1.0],
  ]);
  let dets = pipeline
    .detect(&[HeadOutput::flat(&tensor)], ImageSize::new(640, 640))
    .unwrap();
  assert_eq!(dets.len(), 2);
  assert_eq!(dets[0].class_id, 0);
  assert_eq!(dets[1].class_id, 1);
}

#[test]
fn random_flat_output_respects_invariants() {
  init_tracing();
  let config = DetectConfig::default();
  let pipeline = DetectionPipeline::new(config.clone()).unwrap();
  let mut rng = StdRng::seed_from_u64(7);
  let original = ImageSize::new(1280, 720);

  for _ in 0..5 {
    let tensor = random_flat(&mut rng, 300);
    let dets = pipeline.detect(&[HeadOutput::flat(&tensor)], original).unwrap();
    assert_invariants(&dets, &config, original);
  }
}

#[test]
fn random_multi_scale_grid_output_respects_invariants() {
  init_tracing();
  let config = DetectConfig::default();
  let pipeline = DetectionPipeline::new(config.clone()).unwrap();
  let mut rng = StdRng::seed_from_u64(42);
  let original = ImageSize::new(1920, 1080);

  let p3 = random_grid(&mut rng, 80);
  let p4 = random_grid(&mut rng, 40);
  let p5 = random_grid(&mut rng, 20);
  let heads = [
    HeadOutput::grid(&p3),
    HeadOutput::grid(&p4),
    HeadOutput::grid(&p5),
  ];
  let dets = pipeline.detect(&heads, original).unwrap();
  assert!(!dets.is_empty());
  assert_invariants(&dets, &config, original);
}

#[test]
fn detect_is_idempotent() {
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();
  let mut rng = StdRng::seed_from_u64(1234);
  let tensor = random_flat(&mut rng, 200);
  let heads = [HeadOutput::flat(&tensor)];
  let original = ImageSize::new(640, 480);

  let first = pipeline.detect(&heads, original).unwrap();
  let second = pipeline.detect(&heads, original).unwrap();
  assert_eq!(first, second);
}

#[test]
fn raising_threshold_only_removes_detections() {
  let mut rng = StdRng::seed_from_u64(99);
  let tensor = random_flat(&mut rng, 300);
  let heads = [HeadOutput::flat(&tensor)];
  let original = ImageSize::new(640, 640);

  let low = DetectionPipeline::new(DetectConfig::default().with_confidence_threshold(0.3))
    .unwrap()
    .detect(&heads, original)
    .unwrap();
  let high = DetectionPipeline::new(DetectConfig::default().with_confidence_threshold(0.6))
    .unwrap()
    .detect(&heads, original)
    .unwrap();

  let expected: Vec<Detection> = low.into_iter().filter(|d| d.confidence > 0.6).collect();
  assert_eq!(high, expected);
}

#[test]
fn non_finite_boxes_never_become_detections() {
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();
  let original = ImageSize::new(640, 640);

  let tensor = flat(&[[320.0, 320.0, f32::INFINITY, 100.0, 0.9, 0.8, 0.1]]);
  let dets = pipeline.detect(&[HeadOutput::flat(&tensor)], original).unwrap();
  assert!(dets.is_empty(), "{:?}", dets);

  // 20x20 网格，格子 (5, 5) 的 tw = 100，exp 溢出为无穷大
  let side = 20;
  let spatial = side * side;
  let cell = 5 * side + 5;
  let mut data = vec![-20.0f32; 21 * spatial];
  for c in 0..4 {
    data[c * spatial + cell] = 0.0;
  }
  data[2 * spatial + cell] = 100.0;
  data[4 * spatial + cell] = 5.0;
  data[5 * spatial + cell] = 20.0;
  let tensor = RawTensor::new(data, &[1, 21, side, side]).unwrap();
  let dets = pipeline.detect(&[HeadOutput::grid(&tensor)], original).unwrap();
  assert!(dets.is_empty(), "{:?}", dets);
}

#[test]
fn structural_error_in_any_head_fails_the_call() {
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();
  let good = flat(&[[320.0, 320.0, 100.0, 100.0, 0.9, 0.8, 0.1]]);
  let wide = RawTensor::new(vec![0.0f32; 85], &[1, 85]).unwrap();
  let err = pipeline
    .detect(
      &[HeadOutput::flat(&good), HeadOutput::flat(&wide)],
      ImageSize::new(640, 640),
    )
    .unwrap_err();
  assert_eq!(
    err,
    DetectError::UnsupportedRowWidth {
      expected: 7,
      actual: 85
    }
  );
}

#[test]
fn empty_input_is_reported() {
  let pipeline = DetectionPipeline::new(DetectConfig::default()).unwrap();
  assert_eq!(
    pipeline.detect(&[], ImageSize::new(640, 640)).unwrap_err(),
    DetectError::EmptyInput
  );
}
