// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/config.rs - 检测流水线配置
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
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, error::DetectError, geometry::ImageSize};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;
pub const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NUM_CLASSES: usize = 2; // fire, smoke
pub const DEFAULT_INPUT_SIZE: ImageSize = ImageSize::new(640, 640);

const STRIDE_TOLERANCE: f32 = 1e-3;

const YOLOV5_ANCHORS: [(f32, [(f32, f32); 3]); 3] = [
  (8.0, [(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)]),
  (16.0, [(30.0, 61.0), (62.0, 45.0), (59.0, 119.0)]),
  (32.0, [(116.0, 90.0), (156.0, 198.0), (373.0, 326.0)]),
];

/// 某一检测尺度上的锚框，`(w, h)` 单位为模型输入像素
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSet {
  stride: f32,
  anchors: Vec<(f32, f32)>,
}

impl AnchorSet {
  pub fn new(stride: f32, anchors: Vec<(f32, f32)>) -> Self {
    Self { stride, anchors }
  }

  /// YOLOv5 默认的 P3/P4/P5 三个尺度
  pub fn yolov5_defaults() -> Vec<AnchorSet> {
    YOLOV5_ANCHORS
      .iter()
      .map(|(stride, anchors)| AnchorSet::new(*stride, anchors.to_vec()))
      .collect()
  }

  pub fn stride(&self) -> f32 {
    self.stride
  }

  pub fn anchors(&self) -> &[(f32, f32)] {
    &self.anchors
  }

  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn matches_stride(&self, stride: f32) -> bool {
    (self.stride - stride).abs() <= STRIDE_TOLERANCE
  }
}

/// Flat 输出中坐标的单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlatUnits {
  /// 模型输入像素
  #[default]
  Pixels,
  /// 相对模型输入尺寸归一化到 `[0, 1]`
  Normalized,
}

/// 检测流水线配置，流水线生命周期内不可变
#[derive(Debug, Clone, PartialEq)]
pub struct DetectConfig {
  pub confidence_threshold: f32,
  pub nms_iou_threshold: f32,
  pub num_classes: usize,
  pub model_input_size: ImageSize,
  pub anchors: Vec<AnchorSet>,
  pub flat_units: FlatUnits,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
      num_classes: DEFAULT_NUM_CLASSES,
      model_input_size: DEFAULT_INPUT_SIZE,
      anchors: AnchorSet::yolov5_defaults(),
      flat_units: FlatUnits::default(),
    }
  }
}

impl DetectConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_nms_iou_threshold(mut self, threshold: f32) -> Self {
    self.nms_iou_threshold = threshold;
    self
  }

  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn with_model_input_size(mut self, size: ImageSize) -> Self {
    self.model_input_size = size;
    self
  }

  pub fn with_anchors(mut self, anchors: Vec<AnchorSet>) -> Self {
    self.anchors = anchors;
    self
  }

  pub fn with_flat_units(mut self, units: FlatUnits) -> Self {
    self.flat_units = units;
    self
  }

  pub fn anchors_for_stride(&self, stride: f32) -> Option<&AnchorSet> {
    self.anchors.iter().find(|set| set.matches_stride(stride))
  }

  pub fn validate(&self) -> Result<(), DetectError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(DetectError::InvalidConfig(format!(
        "置信度阈值必须在 [0, 1] 内, 实际为 {}",
        self.confidence_threshold
      )));
    }
    if !(0.0..=1.0).contains(&self.nms_iou_threshold) {
      return Err(DetectError::InvalidConfig(format!(
        "NMS IoU 阈值必须在 [0, 1] 内, 实际为 {}",
        self.nms_iou_threshold
      )));
    }
    if self.num_classes == 0 {
      return Err(DetectError::InvalidConfig("类别数量不能为 0".to_string()));
    }
    if self.model_input_size.width == 0 || self.model_input_size.height == 0 {
      return Err(DetectError::InvalidConfig(format!(
        "模型输入尺寸无效: {}x{}",
        self.model_input_size.width, self.model_input_size.height
      )));
    }
    for set in &self.anchors {
      if !(set.stride > 0.0) || set.is_empty() {
        return Err(DetectError::InvalidConfig(format!(
          "锚框配置无效: 步长 {}, 锚框数量 {}",
          set.stride,
          set.len()
        )));
      }
    }
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("配置无效: {0}")]
  Invalid(#[from] DetectError),
}

impl ConfigError {
  fn invalid_value(key: &str, value: &str) -> Self {
    ConfigError::InvalidValue {
      key: key.to_string(),
      value: value.to_string(),
    }
  }
}

/// 解析 `640x480` 或 `640`
pub(crate) fn parse_size(value: &str) -> Option<ImageSize> {
  match value.split_once(['x', 'X']) {
    Some((w, h)) => Some(ImageSize::new(w.trim().parse().ok()?, h.trim().parse().ok()?)),
    None => {
      let side = value.trim().parse().ok()?;
      Some(ImageSize::new(side, side))
    }
  }
}

/// 解析单个尺度的锚框，格式为 `32:116x90,156x198,373x326`
fn parse_anchor_set(value: &str) -> Option<AnchorSet> {
  let (stride, pairs) = value.split_once(':')?;
  let stride: f32 = stride.trim().parse().ok()?;
  let anchors = pairs
    .split(',')
    .map(|pair| {
      let (w, h) = pair.split_once(['x', 'X'])?;
      Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    })
    .collect::<Option<Vec<(f32, f32)>>>()?;
  Some(AnchorSet::new(stride, anchors))
}

impl FromUrlWithScheme for DetectConfig {
  const SCHEME: &'static str = "detect";
}

/// 从 URL 构造配置，例如
/// `detect://?conf=0.4&iou=0.5&classes=2&input=640x640&anchors=yolov5&units=pixel`
///
/// `anchors` 可以重复出现，每次给出一个尺度；`yolov5` 表示默认锚框，`none` 表示不配置锚框。
impl FromUrl for DetectConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConfigError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut config = DetectConfig::default();
    let mut anchors: Option<Vec<AnchorSet>> = None;

    for (key, value) in url.query_pairs() {
      match &*key {
        "conf" | "confidence" => {
          config.confidence_threshold = value
            .parse()
            .map_err(|_| ConfigError::invalid_value(&key, &value))?;
        }
        "iou" | "nms" => {
          config.nms_iou_threshold = value
            .parse()
            .map_err(|_| ConfigError::invalid_value(&key, &value))?;
        }
        "classes" => {
          config.num_classes = value
            .parse()
            .map_err(|_| ConfigError::invalid_value(&key, &value))?;
        }
        "input" => {
          config.model_input_size =
            parse_size(&value).ok_or_else(|| ConfigError::invalid_value(&key, &value))?;
        }
        "units" => {
          config.flat_units = match &*value {
            "pixel" | "pixels" => FlatUnits::Pixels,
            "normalized" => FlatUnits::Normalized,
            _ => return Err(ConfigError::invalid_value(&key, &value)),
          };
        }
        "anchors" => {
          let sets = anchors.get_or_insert_with(Vec::new);
          match &*value {
            "yolov5" => sets.extend(AnchorSet::yolov5_defaults()),
            "none" => sets.clear(),
            other => sets.push(
              parse_anchor_set(other).ok_or_else(|| ConfigError::invalid_value(&key, &value))?,
            ),
          }
        }
        other => warn!("忽略未知的配置参数: {}={}", other, value),
      }
    }

    if let Some(anchors) = anchors {
      config.anchors = anchors;
    }

    config.validate()?;
    info!(
      "检测配置: 置信度阈值 {}, NMS 阈值 {}, 类别数 {}, 输入 {}x{}, 锚框尺度 {}",
      config.confidence_threshold,
      config.nms_iou_threshold,
      config.num_classes,
      config.model_input_size.width,
      config.model_input_size.height,
      config.anchors.len()
    );
    Ok(config)
  }
}
