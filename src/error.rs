// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/error.rs - 检测核心错误定义
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

use thiserror::Error;

use crate::tensor::OutputLayout;

/// 检测核心的结构性错误
///
/// 这些错误都在数值计算开始之前检出，表示调用方传入的张量或配置本身有问题。
/// 单个候选框的数值噪声（NaN、退化框等）不会产生错误，只会被静默丢弃。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
  #[error("张量形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error("不支持的批大小: {0}（仅支持 1）")]
  UnsupportedBatchSize(usize),
  #[error("不支持的网格形状: {0}")]
  UnsupportedGridShape(String),
  #[error("检测行宽度不匹配: 期望 {expected}, 实际 {actual}")]
  UnsupportedRowWidth { expected: usize, actual: usize },
  #[error("张量布局不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  LayoutMismatch {
    expected: OutputLayout,
    actual: OutputLayout,
  },
  #[error("步长 {0} 没有对应的锚框配置")]
  MissingAnchors(f32),
  #[error("没有输入张量")]
  EmptyInput,
  #[error("配置无效: {0}")]
  InvalidConfig(String),
}

impl DetectError {
  pub fn shape(msg: impl Into<String>) -> Self {
    DetectError::ShapeMismatch(msg.into())
  }

  pub fn grid(msg: impl Into<String>) -> Self {
    DetectError::UnsupportedGridShape(msg.into())
  }
}
