// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/input.rs - 模型输出张量的读取
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

use serde::Deserialize;
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, error::DetectError, pipeline::FrameTensors, tensor::RawTensor};

mod manifest;
pub use self::manifest::{FrameManifest, HeadManifest, ManifestInput, ManifestInputError};

mod tensor_file;
pub use self::tensor_file::{TensorFileInput, TensorFileInputError};

/// 张量文件中的元素类型，均为小端序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorDtype {
  #[default]
  F32,
  /// 量化输出，读取后按 `(q - zero_point) * scale` 反量化
  I8,
}

impl TensorDtype {
  pub fn size(&self) -> usize {
    match self {
      TensorDtype::F32 => 4,
      TensorDtype::I8 => 1,
    }
  }
}

#[derive(Error, Debug)]
pub enum TensorReadError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("数据长度 {len} 字节不是元素大小 {size} 字节的整数倍")]
  Misaligned { len: usize, size: usize },
  #[error("张量错误: {0}")]
  TensorError(#[from] DetectError),
}

pub fn decode_tensor_bytes(
  bytes: &[u8],
  shape: &[usize],
  dtype: TensorDtype,
  zero_point: i32,
  scale: f32,
) -> Result<RawTensor, TensorReadError> {
  if bytes.len() % dtype.size() != 0 {
    return Err(TensorReadError::Misaligned {
      len: bytes.len(),
      size: dtype.size(),
    });
  }
  let tensor = match dtype {
    TensorDtype::F32 => {
      let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
      RawTensor::new(data, shape)?
    }
    TensorDtype::I8 => {
      let data: Vec<i8> = bytes.iter().map(|&b| b as i8).collect();
      RawTensor::from_quantized(&data, zero_point, scale, shape)?
    }
  };
  Ok(tensor)
}

pub fn read_tensor_file(
  path: &Path,
  shape: &[usize],
  dtype: TensorDtype,
  zero_point: i32,
  scale: f32,
) -> Result<RawTensor, TensorReadError> {
  let bytes = std::fs::read(path)?;
  decode_tensor_bytes(&bytes, shape, dtype, zero_point, scale)
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("清单输入错误: {0}")]
  ManifestInputError(#[from] ManifestInputError),
  #[error("张量文件输入错误: {0}")]
  TensorFileInputError(#[from] TensorFileInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  Manifest(ManifestInput),
  TensorFile(TensorFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ManifestInput::SCHEME => Ok(InputWrapper::Manifest(ManifestInput::from_url(url)?)),
      TensorFileInput::SCHEME => Ok(InputWrapper::TensorFile(TensorFileInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = FrameTensors;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::Manifest(input) => input.next(),
      InputWrapper::TensorFile(input) => input.next(),
    }
  }
}
