// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/input/tensor_file.rs - 读取单个输出张量文件
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

use std::path::Path;

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::{DEFAULT_INPUT_SIZE, parse_size},
  input::{TensorDtype, TensorReadError, read_tensor_file},
  pipeline::FrameTensors,
  tensor::OutputLayout,
};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("缺少参数: {0}")]
  MissingParameter(&'static str),
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("读取张量失败: {0}")]
  TensorError(#[from] TensorReadError),
}

fn invalid(key: &str, value: &str) -> TensorFileInputError {
  TensorFileInputError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  }
}

/// 单个张量文件作为单头输入，例如
/// `tensor:///tmp/output0.bin?shape=1,25200,7&layout=flat&image=1920x1080`
///
/// 量化输出加上 `dtype=i8&zp=-128&scale=0.0039`。未给出 `image` 时按 640x640 处理。
pub struct TensorFileInput {
  frame: Option<FrameTensors>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemeMismatch);
    }

    let mut shape = None;
    let mut layout = None;
    let mut image_size = DEFAULT_INPUT_SIZE;
    let mut dtype = TensorDtype::F32;
    let mut zero_point = 0i32;
    let mut scale = 1.0f32;

    for (key, value) in url.query_pairs() {
      match &*key {
        "shape" => {
          let dims = value
            .split(',')
            .map(|d| d.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid(&key, &value))?;
          shape = Some(dims);
        }
        "layout" => {
          layout = Some(match &*value {
            "flat" => OutputLayout::Flat,
            "grid" => OutputLayout::Grid,
            _ => return Err(invalid(&key, &value)),
          });
        }
        "image" => image_size = parse_size(&value).ok_or_else(|| invalid(&key, &value))?,
        "dtype" => {
          dtype = match &*value {
            "f32" => TensorDtype::F32,
            "i8" => TensorDtype::I8,
            _ => return Err(invalid(&key, &value)),
          };
        }
        "zp" | "zero_point" => zero_point = value.parse().map_err(|_| invalid(&key, &value))?,
        "scale" => scale = value.parse().map_err(|_| invalid(&key, &value))?,
        _ => {}
      }
    }

    let shape = shape.ok_or(TensorFileInputError::MissingParameter("shape"))?;
    let layout = layout.ok_or(TensorFileInputError::MissingParameter("layout"))?;
    let tensor = read_tensor_file(Path::new(url.path()), &shape, dtype, zero_point, scale)?;
    info!("张量文件输入: {}, 形状 {:?}, 布局 {:?}", url.path(), shape, layout);

    Ok(TensorFileInput {
      frame: Some(FrameTensors {
        heads: vec![(tensor, layout)],
        image_size,
      }),
    })
  }
}

impl Iterator for TensorFileInput {
  type Item = FrameTensors;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}
