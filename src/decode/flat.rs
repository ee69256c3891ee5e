// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/decode/flat.rs - 逐行检测输出解码
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

use tracing::debug;

use crate::{
  config::{DetectConfig, FlatUnits},
  decode::{Decoder, argmax},
  error::DetectError,
  geometry::{ImageSize, clamp, scale_to_original, to_corners},
  model::Candidate,
  tensor::{OutputLayout, TensorView},
};

const BOX_FIELDS: usize = 5;

/// 解码已经合并好的逐行输出（YOLOv5 导出的 `[N, 5 + K]`）
pub struct FlatDecoder<'c> {
  config: &'c DetectConfig,
}

impl<'c> FlatDecoder<'c> {
  pub fn new(config: &'c DetectConfig) -> Self {
    Self { config }
  }
}

fn is_probability(v: f32) -> bool {
  (0.0..=1.0).contains(&v)
}

impl Decoder for FlatDecoder<'_> {
  fn check(&self, view: &TensorView<'_>) -> Result<(), DetectError> {
    if view.layout() != OutputLayout::Flat {
      return Err(DetectError::LayoutMismatch {
        expected: OutputLayout::Flat,
        actual: view.layout(),
      });
    }
    let expected = BOX_FIELDS + self.config.num_classes;
    if view.cols() != expected {
      return Err(DetectError::UnsupportedRowWidth {
        expected,
        actual: view.cols(),
      });
    }
    Ok(())
  }

  fn decode(
    &self,
    view: &TensorView<'_>,
    original: ImageSize,
    out: &mut Vec<Candidate>,
  ) -> Result<usize, DetectError> {
    self.check(view)?;

    let threshold = self.config.confidence_threshold;
    let input = self.config.model_input_size;
    let (ux, uy) = match self.config.flat_units {
      FlatUnits::Pixels => (1.0, 1.0),
      FlatUnits::Normalized => (input.w(), input.h()),
    };

    let before = out.len();
    let mut dropped = 0usize;

    for r in 0..view.rows() {
      let row = view.row(r);

      // 先用目标置信度做廉价过滤，再扫描类别分数
      let objectness = row[4];
      if !(objectness > threshold) {
        continue;
      }
      if !is_probability(objectness) {
        dropped += 1;
        continue;
      }

      let Some((class_id, class_score)) = argmax(row[BOX_FIELDS..].iter().copied()) else {
        dropped += 1;
        continue;
      };
      if !is_probability(class_score) {
        dropped += 1;
        continue;
      }

      let confidence = objectness * class_score;
      if confidence <= threshold {
        continue;
      }

      if !row[..4].iter().all(|v| v.is_finite()) {
        dropped += 1;
        continue;
      }

      let bbox = to_corners(row[0] * ux, row[1] * uy, row[2] * ux, row[3] * uy);
      let Some(bbox) = clamp(scale_to_original(bbox, input, original), original) else {
        dropped += 1;
        continue;
      };

      out.push(Candidate {
        bbox,
        confidence,
        class_id,
      });
    }

    let emitted = out.len() - before;
    debug!(
      "Flat 解码: {} 行, 候选 {} 个, 丢弃异常行 {} 个",
      view.rows(),
      emitted,
      dropped
    );
    Ok(emitted)
  }
}
