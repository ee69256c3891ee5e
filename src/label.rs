// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/label.rs - 类别标签
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

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

/// 火灾烟雾模型的类别：0 为火焰，1 为烟雾
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FireSmokeLabel {
  Fire,
  Smoke,
  Unknown(u32),
}

impl WithLabel for FireSmokeLabel {
  fn to_label_str(&self) -> String {
    match self {
      FireSmokeLabel::Fire => "fire".to_string(),
      FireSmokeLabel::Smoke => "smoke".to_string(),
      FireSmokeLabel::Unknown(id) => format!("unknown-{}", id),
    }
  }

  fn to_label_id(&self) -> u32 {
    match self {
      FireSmokeLabel::Fire => 0,
      FireSmokeLabel::Smoke => 1,
      FireSmokeLabel::Unknown(id) => *id,
    }
  }

  fn from_label_id(id: u32) -> Self {
    match id {
      0 => FireSmokeLabel::Fire,
      1 => FireSmokeLabel::Smoke,
      other => FireSmokeLabel::Unknown(other),
    }
  }
}

/// 不带名称的原始类别编号
impl WithLabel for u32 {
  fn to_label_str(&self) -> String {
    self.to_string()
  }

  fn to_label_id(&self) -> u32 {
    *self
  }

  fn from_label_id(id: u32) -> Self {
    id
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fire_smoke_labels_round_trip_ids() {
    for id in 0..4 {
      assert_eq!(FireSmokeLabel::from_label_id(id).to_label_id(), id);
    }
    assert_eq!(FireSmokeLabel::from_label_id(0).to_label_str(), "fire");
    assert_eq!(FireSmokeLabel::from_label_id(1).to_label_str(), "smoke");
    assert_eq!(FireSmokeLabel::from_label_id(7).to_label_str(), "unknown-7");
  }

  #[test]
  fn raw_ids_render_as_numbers() {
    assert_eq!(<u32 as WithLabel>::from_label_id(3).to_label_str(), "3");
  }
}
