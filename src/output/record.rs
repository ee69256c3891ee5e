// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/output/record.rs - 检测结果的文本记录
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

use std::{
  marker::PhantomData,
  sync::{Mutex, PoisonError},
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{label::WithLabel, model::DetectResult, pipeline::FrameTensors};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
  pub label: String,
  pub class_id: u32,
  pub confidence: f32,
  /// `[x1, y1, x2, y2]`，原图像素坐标
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
  pub timestamp: String,
  pub frame: u64,
  pub image_size: [u32; 2],
  pub count: usize,
  pub detections: Vec<DetectionRecord>,
}

/// 把检测结果整理成逐帧记录
///
/// URL 参数 `record=id` 只记录类别编号，默认记录类别名称；
/// 带 `always` 时没有检测结果的帧也会记录。
pub struct Record<T: WithLabel> {
  pub label_with_name: bool,
  pub always: bool,
  frame_counter: Mutex<u64>,
  _label: PhantomData<fn() -> T>,
}

impl<T: WithLabel> Record<T> {
  pub fn new(label_with_name: bool, always: bool) -> Self {
    Self {
      label_with_name,
      always,
      frame_counter: Mutex::new(0),
      _label: PhantomData,
    }
  }

  pub fn with_url(url: &Url) -> Self {
    let label_with_name = !url.query_pairs().any(|(k, v)| k == "record" && v == "id");
    let always = url.query_pairs().any(|(k, _)| k == "always");
    Self::new(label_with_name, always)
  }

  fn frame_id(&self) -> u64 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter += 1;
    *counter
  }

  /// 每次调用都会推进帧编号；被跳过的帧返回 None
  pub fn frame_record(&self, frame: &FrameTensors, result: &DetectResult) -> Option<FrameRecord> {
    let frame_id = self.frame_id();
    if !self.always && result.is_empty() {
      return None;
    }

    let detections = result
      .iter()
      .map(|item| DetectionRecord {
        label: if self.label_with_name {
          item.label::<T>().to_label_str()
        } else {
          item.class_id.to_string()
        },
        class_id: item.class_id,
        confidence: item.confidence,
        bbox: item.bbox.to_array(),
      })
      .collect();

    Some(FrameRecord {
      timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      frame: frame_id,
      image_size: [frame.image_size.width, frame.image_size.height],
      count: result.len(),
      detections,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    geometry::{BBox, ImageSize},
    label::FireSmokeLabel,
    model::Detection,
  };

  fn frame() -> FrameTensors {
    FrameTensors {
      heads: Vec::new(),
      image_size: ImageSize::new(1920, 1080),
    }
  }

  fn smoke() -> DetectResult {
    DetectResult::from(vec![Detection {
      bbox: BBox::new(10.0, 20.0, 30.0, 40.0),
      confidence: 0.8,
      class_id: 1,
    }])
  }

  #[test]
  fn records_label_names_by_default() {
    let record = Record::<FireSmokeLabel>::with_url(&Url::parse("json:///tmp/out.jsonl").unwrap());
    let rec = record.frame_record(&frame(), &smoke()).unwrap();
    assert_eq!(rec.frame, 1);
    assert_eq!(rec.count, 1);
    assert_eq!(rec.detections[0].label, "smoke");
    assert_eq!(rec.detections[0].bbox, [10.0, 20.0, 30.0, 40.0]);
  }

  #[test]
  fn record_id_uses_class_numbers() {
    let record = Record::<FireSmokeLabel>::with_url(&Url::parse("stdout:?record=id").unwrap());
    let rec = record.frame_record(&frame(), &smoke()).unwrap();
    assert_eq!(rec.detections[0].label, "1");
  }

  #[test]
  fn empty_frames_are_skipped_but_counted() {
    let record = Record::<FireSmokeLabel>::new(true, false);
    assert!(record.frame_record(&frame(), &DetectResult::default()).is_none());
    let rec = record.frame_record(&frame(), &smoke()).unwrap();
    assert_eq!(rec.frame, 2);

    let always = Record::<FireSmokeLabel>::new(true, true);
    let rec = always.frame_record(&frame(), &DetectResult::default()).unwrap();
    assert_eq!(rec.count, 0);
  }
}
