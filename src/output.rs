// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/output.rs - 检测结果输出
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
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  label::{FireSmokeLabel, WithLabel},
  model::DetectResult,
  pipeline::FrameTensors,
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod record;
pub use self::record::{DetectionRecord, FrameRecord, Record, RecordOutputError};

mod json_lines;
pub use self::json_lines::JsonLinesOutput;

mod console;
pub use self::console::ConsoleOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("记录输出错误: {0}")]
  RecordOutputError(#[from] RecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper<T: WithLabel = FireSmokeLabel> {
  JsonLines(JsonLinesOutput<T>),
  Console(ConsoleOutput<T>),
}

impl<T: WithLabel> FromUrl for OutputWrapper<T> {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let scheme = url.scheme();
    if scheme == JsonLinesOutput::<T>::SCHEME {
      let output = JsonLinesOutput::from_url(url)?;
      return Ok(OutputWrapper::JsonLines(output));
    }
    if scheme == ConsoleOutput::<T>::SCHEME {
      let output = ConsoleOutput::from_url(url)?;
      return Ok(OutputWrapper::Console(output));
    }
    Err(OutputError::SchemeMismatch)
  }
}

impl<T: WithLabel> Render<FrameTensors, DetectResult> for OutputWrapper<T> {
  type Error = OutputError;

  fn render_result(&self, frame: &FrameTensors, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonLines(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::Console(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
