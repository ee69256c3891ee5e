// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/model.rs - 模型抽象与检测结果
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

use crate::{geometry::BBox, label::WithLabel};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 解码器产生的候选框，坐标位于原图像素空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: BBox,
  pub confidence: f32,
  pub class_id: u32,
}

/// NMS 之后保留下来的检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: BBox,
  pub confidence: f32,
  pub class_id: u32,
}

impl From<Candidate> for Detection {
  fn from(c: Candidate) -> Self {
    Self {
      bbox: c.bbox,
      confidence: c.confidence,
      class_id: c.class_id,
    }
  }
}

impl Detection {
  pub fn label<T: WithLabel>(&self) -> T {
    T::from_label_id(self.class_id)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  pub fn count_by_class(&self, class_id: u32) -> usize {
    self.items.iter().filter(|d| d.class_id == class_id).count()
  }
}
