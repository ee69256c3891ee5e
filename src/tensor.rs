// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/tensor.rs - 模型输出张量与只读视图
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

use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// 模型输出的排布方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
  /// `[N, C]` 或 `[1, N, C]`，每行 `[cx, cy, w, h, obj, cls_0 .. cls_{K-1}]`
  Flat,
  /// `[C, H, W]` 或 `[1, C, H, W]`，通道优先，每个锚框占连续的 `5 + K` 个通道
  Grid,
}

impl OutputLayout {
  /// 去掉批维度之后的维数
  pub fn rank(&self) -> usize {
    match self {
      OutputLayout::Flat => 2,
      OutputLayout::Grid => 3,
    }
  }
}

/// 按形状计算元素个数，溢出时返回 None
fn element_count(shape: &[usize]) -> Option<usize> {
  shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn check_element_count(len: usize, shape: &[usize]) -> Result<(), DetectError> {
  match element_count(shape) {
    Some(expected) if expected == len => Ok(()),
    Some(expected) => Err(DetectError::shape(format!(
      "形状 {:?} 需要 {} 个元素, 实际为 {}",
      shape, expected, len
    ))),
    None => Err(DetectError::shape(format!("形状 {:?} 元素个数溢出", shape))),
  }
}

/// 反量化后的模型输出，元素个数总是等于各维度的乘积
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
  data: Box<[f32]>,
  shape: Box<[usize]>,
}

impl RawTensor {
  pub fn new(data: impl Into<Box<[f32]>>, shape: &[usize]) -> Result<Self, DetectError> {
    let data = data.into();
    check_element_count(data.len(), shape)?;
    Ok(Self {
      data,
      shape: shape.into(),
    })
  }

  /// 由 INT8 量化输出构造，按 `(q - zero_point) * scale` 反量化
  pub fn from_quantized(
    data: &[i8],
    zero_point: i32,
    scale: f32,
    shape: &[usize],
  ) -> Result<Self, DetectError> {
    Self::new(dequantize_affine(data, zero_point, scale), shape)
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn view(&self, layout: OutputLayout) -> Result<TensorView<'_>, DetectError> {
    TensorView::new(self, layout)
  }
}

/// NPU 输出的仿射反量化
pub fn dequantize_affine(data: &[i8], zero_point: i32, scale: f32) -> Vec<f32> {
  data
    .iter()
    .map(|&q| (q as i32 - zero_point) as f32 * scale)
    .collect()
}

/// 张量数值统计，用于排查模型输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorStats {
  pub min: f32,
  pub max: f32,
  pub mean: f32,
  pub count: usize,
}

/// 带布局信息的只读张量视图
///
/// 构造时校验形状与元素个数一致，并透明地去掉大小为 1 的批维度。
/// 视图只借用数据，不做拷贝。
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
  data: &'a [f32],
  layout: OutputLayout,
  dims: [usize; 3],
}

impl<'a> TensorView<'a> {
  pub fn new(tensor: &'a RawTensor, layout: OutputLayout) -> Result<Self, DetectError> {
    Self::from_slice(tensor.data(), tensor.shape(), layout)
  }

  /// 直接包装外部缓冲区，例如推理运行时返回的输出
  pub fn from_slice(
    data: &'a [f32],
    shape: &[usize],
    layout: OutputLayout,
  ) -> Result<Self, DetectError> {
    check_element_count(data.len(), shape)?;

    let rank = layout.rank();
    let dims = if shape.len() == rank + 1 {
      if shape[0] != 1 {
        return Err(DetectError::UnsupportedBatchSize(shape[0]));
      }
      &shape[1..]
    } else if shape.len() == rank {
      shape
    } else {
      return Err(DetectError::shape(format!(
        "{:?} 布局需要 {} 或 {} 维, 实际形状 {:?}",
        layout,
        rank,
        rank + 1,
        shape
      )));
    };

    let mut fixed = [1usize; 3];
    fixed[..rank].copy_from_slice(dims);

    Ok(Self {
      data,
      layout,
      dims: fixed,
    })
  }

  pub fn layout(&self) -> OutputLayout {
    self.layout
  }

  /// 去掉批维度之后的形状
  pub fn dims(&self) -> &[usize] {
    &self.dims[..self.layout.rank()]
  }

  pub fn data(&self) -> &'a [f32] {
    self.data
  }

  /// 按多维下标读取元素，维数不符或越界时返回 None
  pub fn get(&self, index: &[usize]) -> Option<f32> {
    let dims = self.dims();
    if index.len() != dims.len() {
      return None;
    }
    let mut offset = 0usize;
    for (&i, &d) in index.iter().zip(dims) {
      if i >= d {
        return None;
      }
      offset = offset * d + i;
    }
    self.data.get(offset).copied()
  }

  // Flat 布局: [rows, cols]

  pub fn rows(&self) -> usize {
    self.dims[0]
  }

  pub fn cols(&self) -> usize {
    self.dims[1]
  }

  /// 第 `r` 行的连续切片，仅对 Flat 布局有意义
  pub fn row(&self, r: usize) -> &'a [f32] {
    let cols = self.cols();
    &self.data[r * cols..(r + 1) * cols]
  }

  // Grid 布局: [channels, height, width]

  pub fn channels(&self) -> usize {
    self.dims[0]
  }

  pub fn height(&self) -> usize {
    self.dims[1]
  }

  pub fn width(&self) -> usize {
    self.dims[2]
  }

  /// 第 `c` 个通道的 `H * W` 平面，仅对 Grid 布局有意义
  pub fn plane(&self, c: usize) -> &'a [f32] {
    let size = self.height() * self.width();
    &self.data[c * size..(c + 1) * size]
  }

  pub fn stats(&self) -> Option<TensorStats> {
    if self.data.is_empty() {
      return None;
    }
    let (min, max, sum) = self.data.iter().fold(
      (f32::INFINITY, f32::NEG_INFINITY, 0f64),
      |(min, max, sum), &v| (min.min(v), max.max(v), sum + v as f64),
    );
    Some(TensorStats {
      min,
      max,
      mean: (sum / self.data.len() as f64) as f32,
      count: self.data.len(),
    })
  }

  /// 统计某一列（Flat）或某一通道（Grid）中大于阈值的原始值个数
  pub fn count_above(&self, index: usize, threshold: f32) -> usize {
    match self.layout {
      OutputLayout::Flat => {
        if index >= self.cols() {
          return 0;
        }
        (0..self.rows())
          .filter(|&r| self.row(r)[index] > threshold)
          .count()
      }
      OutputLayout::Grid => {
        if index >= self.channels() {
          return 0;
        }
        self.plane(index).iter().filter(|&&v| v > threshold).count()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn raw_tensor_rejects_wrong_element_count() {
    let err = RawTensor::new(vec![0.0f32; 5], &[2, 3]).unwrap_err();
    assert!(matches!(err, DetectError::ShapeMismatch(_)));
  }

  #[test]
  fn raw_tensor_rejects_overflowing_shape() {
    let err = RawTensor::new(vec![0.0f32; 4], &[usize::MAX, 2]).unwrap_err();
    assert!(matches!(err, DetectError::ShapeMismatch(_)));
  }

  #[test]
  fn batch_dimension_is_stripped() {
    let tensor = RawTensor::new((0..14).map(|v| v as f32).collect::<Vec<_>>(), &[1, 2, 7]).unwrap();
    let view = tensor.view(OutputLayout::Flat).unwrap();
    assert_eq!(view.dims(), &[2, 7]);
    assert_eq!(view.rows(), 2);
    assert_eq!(view.cols(), 7);
    assert_eq!(view.row(1)[0], 7.0);
    assert_eq!(view.get(&[1, 6]), Some(13.0));
  }

  #[test]
  fn batch_other_than_one_is_rejected() {
    let tensor = RawTensor::new(vec![0.0f32; 28], &[2, 2, 7]).unwrap();
    let err = tensor.view(OutputLayout::Flat).unwrap_err();
    assert_eq!(err, DetectError::UnsupportedBatchSize(2));
  }

  #[test]
  fn rank_must_match_layout() {
    let tensor = RawTensor::new(vec![0.0f32; 14], &[2, 7]).unwrap();
    let err = tensor.view(OutputLayout::Grid).unwrap_err();
    assert!(matches!(err, DetectError::ShapeMismatch(_)));
  }

  #[test]
  fn from_slice_validates_element_count() {
    let data = [0.0f32; 10];
    let err = TensorView::from_slice(&data, &[1, 2, 2, 2], OutputLayout::Grid).unwrap_err();
    assert!(matches!(err, DetectError::ShapeMismatch(_)));
  }

  #[test]
  fn grid_multi_index_is_channel_major() {
    // [C=2, H=2, W=3]
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let view = TensorView::from_slice(&data, &[1, 2, 2, 3], OutputLayout::Grid).unwrap();
    assert_eq!(view.channels(), 2);
    assert_eq!(view.height(), 2);
    assert_eq!(view.width(), 3);
    assert_eq!(view.get(&[1, 0, 2]), Some(8.0));
    assert_eq!(view.get(&[0, 1, 1]), Some(4.0));
    assert_eq!(view.plane(1), &data[6..12]);
    assert_eq!(view.get(&[2, 0, 0]), None);
    assert_eq!(view.get(&[0, 0]), None);
  }

  #[test]
  fn dequantize_applies_zero_point_and_scale() {
    let values = dequantize_affine(&[10, 20, -128], 5, 0.5);
    assert_eq!(values, vec![2.5, 7.5, -66.5]);

    let tensor = RawTensor::from_quantized(&[0, 4, 8, 12], 0, 0.25, &[2, 2]).unwrap();
    assert_eq!(tensor.data(), &[0.0, 1.0, 2.0, 3.0]);
  }

  #[test]
  fn stats_and_threshold_counts() {
    let data = [1.0, 2.0, 3.0, 0.9, 0.1, 0.5, 0.2, 0.6, 0.3, 0.05];
    let view = TensorView::from_slice(&data, &[2, 5], OutputLayout::Flat).unwrap();
    let stats = view.stats().unwrap();
    assert_eq!(stats.min, 0.05);
    assert_eq!(stats.max, 3.0);
    assert_eq!(stats.count, 10);
    assert!((stats.mean - 0.865).abs() < 1e-6);
    assert_eq!(view.count_above(4, 0.1), 0);
    assert_eq!(view.count_above(3, 0.4), 1);
    assert_eq!(view.count_above(9, 0.4), 0);

    let empty = TensorView::from_slice(&[], &[0, 7], OutputLayout::Flat).unwrap();
    assert!(empty.stats().is_none());
  }
}
