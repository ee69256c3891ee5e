// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/suppress.rs - 按类别的非极大值抑制
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

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
  geometry::iou,
  model::{Candidate, Detection},
};

/// 贪心 NMS，不同类别的框互不抑制
#[derive(Debug, Clone, Copy)]
pub struct Suppressor {
  iou_threshold: f32,
}

impl Suppressor {
  pub fn new(iou_threshold: f32) -> Self {
    Self { iou_threshold }
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn suppress(&self, candidates: Vec<Candidate>) -> Vec<Detection> {
    let total = candidates.len();

    let mut groups: BTreeMap<u32, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
      groups.entry(candidate.class_id).or_default().push(candidate);
    }

    let mut kept = Vec::new();
    for (class_id, mut group) in groups {
      // 稳定排序，分数相同时保持解码顺序
      group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

      let mut suppressed = vec![false; group.len()];
      let before = kept.len();
      for i in 0..group.len() {
        if suppressed[i] {
          continue;
        }
        let best = group[i];
        kept.push(Detection::from(best));
        for j in (i + 1)..group.len() {
          if !suppressed[j] && iou(&best.bbox, &group[j].bbox) > self.iou_threshold {
            suppressed[j] = true;
          }
        }
      }
      debug!(
        "类别 {}: 候选 {} 个, 保留 {} 个",
        class_id,
        group.len(),
        kept.len() - before
      );
    }

    debug!("NMS: 候选 {} 个, 保留 {} 个", total, kept.len());
    kept
  }
}
