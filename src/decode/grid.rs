// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/decode/grid.rs - 锚框网格特征图解码
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
  config::{AnchorSet, DetectConfig},
  decode::{Decoder, argmax},
  error::DetectError,
  geometry::{ImageSize, clamp, decode_grid_box, scale_to_original, sigmoid, to_corners},
  model::Candidate,
  tensor::{OutputLayout, TensorView},
};

const BOX_FIELDS: usize = 5;

/// 计算网格输出的步长，只接受正方形网格
pub fn grid_stride(view: &TensorView<'_>, config: &DetectConfig) -> Result<f32, DetectError> {
  if view.layout() != OutputLayout::Grid {
    return Err(DetectError::LayoutMismatch {
      expected: OutputLayout::Grid,
      actual: view.layout(),
    });
  }
  let (h, w) = (view.height(), view.width());
  if h == 0 || w == 0 {
    return Err(DetectError::grid(format!("网格尺寸为空: {}x{}", h, w)));
  }
  if h != w {
    return Err(DetectError::grid(format!("仅支持正方形网格, 实际为 {}x{}", h, w)));
  }
  Ok(config.model_input_size.w() / w as f32)
}

/// 解码单个检测头的原始特征图
///
/// 通道布局固定为每个锚框连续的 `[tx, ty, tw, th, tobj, tcls_0 .. tcls_{K-1}]`，
/// 任何其它排布都视为不支持，而不是猜测一种回退方式。
pub struct GridDecoder<'c> {
  config: &'c DetectConfig,
  anchors: &'c AnchorSet,
}

impl<'c> GridDecoder<'c> {
  pub fn new(config: &'c DetectConfig, anchors: &'c AnchorSet) -> Self {
    Self { config, anchors }
  }
}

impl Decoder for GridDecoder<'_> {
  fn check(&self, view: &TensorView<'_>) -> Result<(), DetectError> {
    let stride = grid_stride(view, self.config)?;

    let block = BOX_FIELDS + self.config.num_classes;
    let expected = self.anchors.len() * block;
    if self.anchors.is_empty() || view.channels() != expected {
      return Err(DetectError::grid(format!(
        "通道数 {} 与 {} 个锚框 x (5 + {}) 不符",
        view.channels(),
        self.anchors.len(),
        self.config.num_classes
      )));
    }

    if !self.anchors.matches_stride(stride) {
      return Err(DetectError::grid(format!(
        "网格步长 {} 与锚框步长 {} 不一致",
        stride,
        self.anchors.stride()
      )));
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
    let num_classes = self.config.num_classes;
    let (grid_h, grid_w) = (view.height(), view.width());
    let stride = input.w() / grid_w as f32;
    let block = BOX_FIELDS + num_classes;
    let data = view.data();
    let spatial = grid_h * grid_w;

    let before = out.len();
    let mut dropped = 0usize;

    for (a, &(anchor_w, anchor_h)) in self.anchors.anchors().iter().enumerate() {
      let base = a * block * spatial;
      let channel = |c: usize, cell: usize| data[base + c * spatial + cell];

      for gy in 0..grid_h {
        for gx in 0..grid_w {
          let cell = gy * grid_w + gx;

          // 目标置信度过滤在所有几何计算之前
          let objectness = sigmoid(channel(4, cell));
          if !(objectness > threshold) {
            continue;
          }

          let [cx, cy, w, h] = decode_grid_box(
            channel(0, cell),
            channel(1, cell),
            channel(2, cell),
            channel(3, cell),
            anchor_w,
            anchor_h,
            stride,
            gx,
            gy,
          );

          let Some((class_id, class_score)) =
            argmax((0..num_classes).map(|k| sigmoid(channel(BOX_FIELDS + k, cell))))
          else {
            dropped += 1;
            continue;
          };

          let confidence = objectness * class_score;
          if confidence <= threshold {
            continue;
          }

          let bbox = to_corners(cx, cy, w, h);
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
      }
    }

    let emitted = out.len() - before;
    debug!(
      "Grid 解码: {}x{} 网格, 步长 {}, 锚框 {} 个, 候选 {} 个, 丢弃 {} 个",
      grid_h,
      grid_w,
      stride,
      self.anchors.len(),
      emitted,
      dropped
    );
    Ok(emitted)
  }
}
