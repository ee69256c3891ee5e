// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/pipeline.rs - 解码与抑制流水线
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

use std::cmp::Ordering;

use tracing::{Level, debug, enabled};

use crate::{
  config::DetectConfig,
  decode::{Decoder, FlatDecoder, GridDecoder, grid_stride},
  error::DetectError,
  geometry::ImageSize,
  model::{DetectResult, Detection, Model},
  suppress::Suppressor,
  tensor::{OutputLayout, RawTensor, TensorView},
};

/// 模型的一个输出头：张量加上声明的布局
#[derive(Debug, Clone, Copy)]
pub struct HeadOutput<'a> {
  pub tensor: &'a RawTensor,
  pub layout: OutputLayout,
}

impl<'a> HeadOutput<'a> {
  pub fn new(tensor: &'a RawTensor, layout: OutputLayout) -> Self {
    Self { tensor, layout }
  }

  pub fn flat(tensor: &'a RawTensor) -> Self {
    Self::new(tensor, OutputLayout::Flat)
  }

  pub fn grid(tensor: &'a RawTensor) -> Self {
    Self::new(tensor, OutputLayout::Grid)
  }
}

/// 一帧图像对应的全部模型输出
#[derive(Debug, Clone)]
pub struct FrameTensors {
  pub heads: Vec<(RawTensor, OutputLayout)>,
  pub image_size: ImageSize,
}

impl FrameTensors {
  pub fn head_outputs(&self) -> Vec<HeadOutput<'_>> {
    self
      .heads
      .iter()
      .map(|(tensor, layout)| HeadOutput::new(tensor, *layout))
      .collect()
  }
}

/// 通过结构校验、可以直接解码的输出头
enum PreparedHead<'a> {
  Flat(TensorView<'a>, FlatDecoder<'a>),
  Grid(TensorView<'a>, GridDecoder<'a>),
}

impl PreparedHead<'_> {
  fn view(&self) -> &TensorView<'_> {
    match self {
      PreparedHead::Flat(view, _) | PreparedHead::Grid(view, _) => view,
    }
  }
}

/// 置信度降序；分数相同时依次比较类别、x1、y1，保证输出顺序确定
fn detection_order(a: &Detection, b: &Detection) -> Ordering {
  b.confidence
    .total_cmp(&a.confidence)
    .then_with(|| a.class_id.cmp(&b.class_id))
    .then_with(|| a.bbox.x1.total_cmp(&b.bbox.x1))
    .then_with(|| a.bbox.y1.total_cmp(&b.bbox.y1))
}

/// 检测流水线
///
/// 配置在构造时校验，之后不再变化。`detect` 只读取 `&self`，
/// 不同线程可以对各自的输入同时调用。
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
  config: DetectConfig,
  suppressor: Suppressor,
}

impl DetectionPipeline {
  pub fn new(config: DetectConfig) -> Result<Self, DetectError> {
    config.validate()?;
    let suppressor = Suppressor::new(config.nms_iou_threshold);
    Ok(Self { config, suppressor })
  }

  pub fn config(&self) -> &DetectConfig {
    &self.config
  }

  /// 对所有输出头做结构校验，任何一个不合法都在数值计算前报错
  fn prepare<'a>(&'a self, heads: &[HeadOutput<'a>]) -> Result<Vec<PreparedHead<'a>>, DetectError> {
    let mut prepared = Vec::with_capacity(heads.len());
    for (idx, head) in heads.iter().enumerate() {
      let view = TensorView::new(head.tensor, head.layout)?;
      let head = match head.layout {
        OutputLayout::Flat => {
          let decoder = FlatDecoder::new(&self.config);
          decoder.check(&view)?;
          PreparedHead::Flat(view, decoder)
        }
        OutputLayout::Grid => {
          let stride = grid_stride(&view, &self.config)?;
          let anchors = self
            .config
            .anchors_for_stride(stride)
            .ok_or(DetectError::MissingAnchors(stride))?;
          let decoder = GridDecoder::new(&self.config, anchors);
          decoder.check(&view)?;
          PreparedHead::Grid(view, decoder)
        }
      };
      debug!("检测头 {}: 布局 {:?}, 形状 {:?}", idx, view.layout(), view.dims());
      prepared.push(head);
    }
    Ok(prepared)
  }

  pub fn detect(
    &self,
    heads: &[HeadOutput<'_>],
    original: ImageSize,
  ) -> Result<Vec<Detection>, DetectError> {
    if heads.is_empty() {
      return Err(DetectError::EmptyInput);
    }

    let prepared = self.prepare(heads)?;

    let mut candidates = Vec::new();
    for (idx, head) in prepared.iter().enumerate() {
      if enabled!(Level::DEBUG)
        && let Some(stats) = head.view().stats()
      {
        debug!(
          "检测头 {}: 最小值 {:.6}, 最大值 {:.6}, 平均值 {:.6}",
          idx, stats.min, stats.max, stats.mean
        );
      }

      let emitted = match head {
        PreparedHead::Flat(view, decoder) => decoder.decode(view, original, &mut candidates)?,
        PreparedHead::Grid(view, decoder) => decoder.decode(view, original, &mut candidates)?,
      };
      debug!("检测头 {}: 候选 {} 个", idx, emitted);
    }

    let mut detections = self.suppressor.suppress(candidates);
    detections.sort_by(detection_order);

    debug!("检测到 {} 个物体", detections.len());
    Ok(detections)
  }
}

impl Model for DetectionPipeline {
  type Input = FrameTensors;
  type Output = DetectResult;
  type Error = DetectError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let heads = input.head_outputs();
    let detections = self.detect(&heads, input.image_size)?;
    Ok(DetectResult::from(detections))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AnchorSet;

  fn flat_tensor(rows: &[[f32; 7]]) -> RawTensor {
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    RawTensor::new(data, &[1, rows.len(), 7]).unwrap()
  }

  fn pipeline() -> DetectionPipeline {
    DetectionPipeline::new(DetectConfig::default()).unwrap()
  }

  #[test]
  fn zero_heads_is_an_error() {
    let err = pipeline().detect(&[], ImageSize::new(640, 640)).unwrap_err();
    assert_eq!(err, DetectError::EmptyInput);
  }

  #[test]
  fn nothing_above_threshold_is_empty_not_error() {
    let tensor = flat_tensor(&[[320.0, 320.0, 100.0, 100.0, 0.1, 0.9, 0.1]]);
    let out = pipeline()
      .detect(&[HeadOutput::flat(&tensor)], ImageSize::new(640, 640))
      .unwrap();
    assert!(out.is_empty());
  }

  #[test]
  fn flat_scenario_yields_one_fire_detection() {
    let tensor = flat_tensor(&[
      [320.0, 320.0, 100.0, 100.0, 0.9, 0.8, 0.1],
      [320.0, 320.0, 100.0, 100.0, 0.9, 0.01, 0.01],
    ]);
    let out = pipeline()
      .detect(&[HeadOutput::flat(&tensor)], ImageSize::new(640, 640))
      .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].class_id, 0);
    assert!((out[0].confidence - 0.72).abs() < 1e-3);
  }

  #[test]
  fn output_is_sorted_by_descending_confidence() {
    let tensor = flat_tensor(&[
      [100.0, 100.0, 50.0, 50.0, 0.6, 0.9, 0.1],
      [400.0, 400.0, 50.0, 50.0, 0.95, 0.1, 0.9],
      [250.0, 250.0, 50.0, 50.0, 0.8, 0.9, 0.1],
    ]);
    let out = pipeline()
      .detect(&[HeadOutput::flat(&tensor)], ImageSize::new(640, 640))
      .unwrap();
    assert_eq!(out.len(), 3);
    assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    assert_eq!(out[0].class_id, 1);
  }

  #[test]
  fn malformed_second_head_fails_before_decoding() {
    let good = flat_tensor(&[[320.0, 320.0, 100.0, 100.0, 0.9, 0.8, 0.1]]);
    let bad = RawTensor::new(vec![0.0f32; 7 * 20 * 20], &[2, 7, 10, 20]).unwrap();
    let err = pipeline()
      .detect(
        &[HeadOutput::flat(&good), HeadOutput::grid(&bad)],
        ImageSize::new(640, 640),
      )
      .unwrap_err();
    assert_eq!(err, DetectError::UnsupportedBatchSize(2));
  }

  #[test]
  fn grid_head_without_matching_anchors_is_rejected() {
    let config = DetectConfig::default().with_anchors(vec![AnchorSet::new(32.0, vec![(116.0, 90.0)])]);
    let pipeline = DetectionPipeline::new(config).unwrap();
    let tensor = RawTensor::new(vec![0.0f32; 7 * 40 * 40], &[7, 40, 40]).unwrap();
    let err = pipeline
      .detect(&[HeadOutput::grid(&tensor)], ImageSize::new(640, 640))
      .unwrap_err();
    assert_eq!(err, DetectError::MissingAnchors(16.0));
  }

  #[test]
  fn invalid_config_is_rejected_at_construction() {
    let config = DetectConfig::default().with_nms_iou_threshold(-0.1);
    assert!(matches!(
      DetectionPipeline::new(config),
      Err(DetectError::InvalidConfig(_))
    ));
  }

  #[test]
  fn model_adapter_wraps_detect() {
    let frame = FrameTensors {
      heads: vec![(
        flat_tensor(&[[320.0, 320.0, 100.0, 100.0, 0.9, 0.2, 0.8]]),
        OutputLayout::Flat,
      )],
      image_size: ImageSize::new(1920, 1080),
    };
    let result = pipeline().infer(&frame).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.count_by_class(1), 1);
    assert!((result.items[0].bbox.x1 - 810.0).abs() < 1e-2);
  }

  #[test]
  fn pipeline_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DetectionPipeline>();

    let pipeline = pipeline();
    let tensor = flat_tensor(&[[320.0, 320.0, 100.0, 100.0, 0.9, 0.8, 0.1]]);
    let results: Vec<_> = std::thread::scope(|s| {
      let handles: Vec<_> = (0..4)
        .map(|_| s.spawn(|| pipeline.detect(&[HeadOutput::flat(&tensor)], ImageSize::new(640, 640))))
        .collect();
      handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });
    assert!(results.windows(2).all(|w| w[0] == w[1]));
  }
}
