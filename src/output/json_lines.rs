// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/output/json_lines.rs - 按行追加 JSON 记录到文件
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
  fs::{File, OpenOptions},
  io::Write,
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  label::WithLabel,
  model::DetectResult,
  output::{Render, record::Record, record::RecordOutputError},
  pipeline::FrameTensors,
};

/// `json:///var/log/yanhuo/detections.jsonl?always`
pub struct JsonLinesOutput<T: WithLabel> {
  path: PathBuf,
  file: Mutex<File>,
  record: Record<T>,
}

impl<T: WithLabel> FromUrlWithScheme for JsonLinesOutput<T> {
  const SCHEME: &'static str = "json";
}

impl<T: WithLabel> FromUrl for JsonLinesOutput<T> {
  type Error = RecordOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(RecordOutputError::SchemeMismatch);
    }
    Self::create(url.path(), Record::with_url(url))
  }
}

impl<T: WithLabel> JsonLinesOutput<T> {
  pub fn create(path: impl AsRef<Path>, record: Record<T>) -> Result<Self, RecordOutputError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    info!("检测记录写入 {}", path.display());
    Ok(Self {
      path,
      file: Mutex::new(file),
      record,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl<T: WithLabel> Render<FrameTensors, DetectResult> for JsonLinesOutput<T> {
  type Error = RecordOutputError;

  fn render_result(&self, frame: &FrameTensors, result: &DetectResult) -> Result<(), Self::Error> {
    let Some(record) = self.record.frame_record(frame, result) else {
      return Ok(());
    };
    let line = serde_json::to_string(&record)?;
    let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(file, "{}", line)?;
    file.flush()?;
    Ok(())
  }
}
