// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/output/console.rs - 输出 JSON 记录到标准输出
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

use std::io::Write;

use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  label::WithLabel,
  model::DetectResult,
  output::{Render, record::Record, record::RecordOutputError},
  pipeline::FrameTensors,
};

/// `stdout:`，可加 `?record=id` 或 `?always`
pub struct ConsoleOutput<T: WithLabel> {
  record: Record<T>,
}

impl<T: WithLabel> FromUrlWithScheme for ConsoleOutput<T> {
  const SCHEME: &'static str = "stdout";
}

impl<T: WithLabel> FromUrl for ConsoleOutput<T> {
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
    Ok(Self {
      record: Record::with_url(url),
    })
  }
}

impl<T: WithLabel> Render<FrameTensors, DetectResult> for ConsoleOutput<T> {
  type Error = RecordOutputError;

  fn render_result(&self, frame: &FrameTensors, result: &DetectResult) -> Result<(), Self::Error> {
    if let Some(record) = self.record.frame_record(frame, result) {
      let line = serde_json::to_string(&record)?;
      let mut stdout = std::io::stdout().lock();
      writeln!(stdout, "{}", line)?;
    }
    Ok(())
  }
}
