// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/geometry.rs - 激活函数与边界框几何运算
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

/// 图像尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
  pub width: u32,
  pub height: u32,
}

impl ImageSize {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn w(&self) -> f32 {
    self.width as f32
  }

  pub fn h(&self) -> f32 {
    self.height as f32
  }
}

/// 角点形式的边界框 `[x_min, y_min, x_max, y_max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BBox {
  pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 退化框面积为 0
  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn to_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 由网格单元的回归值和锚框解出中心点与宽高 `[cx, cy, w, h]`，单位为模型输入像素
#[allow(clippy::too_many_arguments)]
pub fn decode_grid_box(
  tx: f32,
  ty: f32,
  tw: f32,
  th: f32,
  anchor_w: f32,
  anchor_h: f32,
  stride: f32,
  gx: usize,
  gy: usize,
) -> [f32; 4] {
  [
    (sigmoid(tx) + gx as f32) * stride,
    (sigmoid(ty) + gy as f32) * stride,
    anchor_w * tw.exp(),
    anchor_h * th.exp(),
  ]
}

pub fn to_corners(cx: f32, cy: f32, w: f32, h: f32) -> BBox {
  BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
}

/// 从模型输入坐标映射回原图坐标
///
/// 预处理是直接拉伸（无 letterbox），所以 x/y 使用各自独立的缩放系数。
pub fn scale_to_original(bbox: BBox, model_input: ImageSize, original: ImageSize) -> BBox {
  let sx = original.w() / model_input.w();
  let sy = original.h() / model_input.h();
  BBox::new(bbox.x1 * sx, bbox.y1 * sy, bbox.x2 * sx, bbox.y2 * sy)
}

/// 严格小于 `v` 的最大浮点数
fn just_below(v: f32) -> f32 {
  if v > 0.0 {
    f32::from_bits(v.to_bits() - 1)
  } else {
    0.0
  }
}

/// 裁剪到 `[0, width) x [0, height)`，含非有限坐标或裁剪后宽或高不为正时返回 None
pub fn clamp(bbox: BBox, original: ImageSize) -> Option<BBox> {
  // 无穷大会被裁剪成整幅图像的边，必须在裁剪前丢弃
  if !bbox.to_array().iter().all(|v| v.is_finite()) {
    return None;
  }

  let max_x = just_below(original.w());
  let max_y = just_below(original.h());
  let clipped = BBox::new(
    bbox.x1.clamp(0.0, max_x),
    bbox.y1.clamp(0.0, max_y),
    bbox.x2.clamp(0.0, max_x),
    bbox.y2.clamp(0.0, max_y),
  );

  if clipped.x2 > clipped.x1 && clipped.y2 > clipped.y1 {
    Some(clipped)
  } else {
    None
  }
}

/// 两个轴对齐框的交并比，`0/0` 记为 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
