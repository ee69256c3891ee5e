// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/decode.rs - 模型输出解码
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

use crate::{error::DetectError, geometry::ImageSize, model::Candidate, tensor::TensorView};

pub trait Decoder {
  /// 只做结构校验，不读取任何数值
  fn check(&self, view: &TensorView<'_>) -> Result<(), DetectError>;

  /// 把候选框追加到 `out`，返回本次追加的数量
  fn decode(
    &self,
    view: &TensorView<'_>,
    original: ImageSize,
    out: &mut Vec<Candidate>,
  ) -> Result<usize, DetectError>;
}

/// 取最大分数的类别，并列时取编号最小者，NaN 不参与比较
pub(crate) fn argmax<I: IntoIterator<Item = f32>>(scores: I) -> Option<(u32, f32)> {
  let mut best: Option<(u32, f32)> = None;
  for (idx, score) in scores.into_iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, b)) if score <= b => {}
      _ => best = Some((idx as u32, score)),
    }
  }
  best
}

mod flat;
mod grid;
pub use self::flat::FlatDecoder;
pub use self::grid::{GridDecoder, grid_stride};
