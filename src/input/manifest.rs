// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/input/manifest.rs - 按 JSON 清单读取一帧的全部输出头
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  geometry::ImageSize,
  input::{TensorDtype, TensorReadError, read_tensor_file},
  pipeline::FrameTensors,
  tensor::OutputLayout,
};

#[derive(Error, Debug)]
pub enum ManifestInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("清单解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("读取张量 {path} 失败: {source}")]
  TensorError {
    path: PathBuf,
    source: TensorReadError,
  },
  #[error("目录中没有清单文件: {0}")]
  EmptyDirectory(PathBuf),
}

fn default_scale() -> f32 {
  1.0
}

/// 清单中的一个输出头
#[derive(Debug, Clone, Deserialize)]
pub struct HeadManifest {
  /// 相对路径以清单文件所在目录为基准
  pub path: PathBuf,
  pub shape: Vec<usize>,
  pub layout: OutputLayout,
  #[serde(default)]
  pub dtype: TensorDtype,
  #[serde(default)]
  pub zero_point: i32,
  #[serde(default = "default_scale")]
  pub scale: f32,
}

/// 一帧的输出清单
///
/// ```json
/// {
///   "image_size": [1920, 1080],
///   "heads": [
///     { "path": "p3.bin", "shape": [1, 21, 80, 80], "layout": "grid" },
///     { "path": "p4.bin", "shape": [1, 21, 40, 40], "layout": "grid", "dtype": "i8", "zero_point": -128, "scale": 0.05 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct FrameManifest {
  pub image_size: [u32; 2],
  pub heads: Vec<HeadManifest>,
}

impl FrameManifest {
  pub fn open(path: &Path) -> Result<Self, ManifestInputError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
  }

  /// 读取清单引用的全部张量文件
  pub fn load(&self, base: &Path) -> Result<FrameTensors, ManifestInputError> {
    let mut heads = Vec::with_capacity(self.heads.len());
    for head in &self.heads {
      let path = if head.path.is_absolute() {
        head.path.clone()
      } else {
        base.join(&head.path)
      };
      let tensor = read_tensor_file(&path, &head.shape, head.dtype, head.zero_point, head.scale)
        .map_err(|source| ManifestInputError::TensorError {
          path: path.clone(),
          source,
        })?;
      heads.push((tensor, head.layout));
    }

    let [width, height] = self.image_size;
    Ok(FrameTensors {
      heads,
      image_size: ImageSize::new(width, height),
    })
  }
}

/// 清单输入：`manifest:///path/frame.json` 读取单帧，
/// `manifest:///path/dir` 按文件名顺序读取目录下全部 `.json` 清单
pub struct ManifestInput {
  manifests: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ManifestInput {
  const SCHEME: &'static str = "manifest";
}

impl FromUrl for ManifestInput {
  type Error = ManifestInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ManifestInputError::SchemeMismatch);
    }
    Self::from_path(url.path())
  }
}

impl ManifestInput {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestInputError> {
    let path = path.as_ref();
    let manifests = if path.is_dir() {
      let mut entries = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let entry = entry?.path();
        if entry.is_file() && entry.extension().is_some_and(|ext| ext == "json") {
          entries.push(entry);
        }
      }
      if entries.is_empty() {
        return Err(ManifestInputError::EmptyDirectory(path.to_path_buf()));
      }
      entries.sort();
      entries
    } else {
      vec![path.to_path_buf()]
    };

    info!("清单输入: {} 个文件", manifests.len());
    Ok(Self {
      manifests: manifests.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.manifests.len()
  }

  fn load(path: &Path) -> Result<FrameTensors, ManifestInputError> {
    let manifest = FrameManifest::open(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    manifest.load(base)
  }
}

/// 无法读取的清单记录错误后跳过
impl Iterator for ManifestInput {
  type Item = FrameTensors;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let path = self.manifests.pop_front()?;
      match Self::load(&path) {
        Ok(frame) => return Some(frame),
        Err(err) => error!("读取清单 {} 失败: {}", path.display(), err),
      }
    }
  }
}
