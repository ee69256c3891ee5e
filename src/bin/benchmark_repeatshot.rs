// 该文件是 Yanhuo （烟火） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 解码与抑制的耗时测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use tracing::info;
use yanhuo::{
  DetectConfig, DetectionPipeline, FromUrl,
  input::InputWrapper,
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};

/// Yanhuo 后处理耗时测试
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测配置，例如 detect://?conf=0.4&iou=0.5
  #[arg(long, value_name = "CONFIG", default_value = "detect://")]
  pub config: Url,
  /// 模型输出来源，manifest:// 或 tensor://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 结果输出，json:// 或 stdout:
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
  /// 重复次数
  #[arg(long, default_value_t = 1000)]
  pub repeat: usize,
  /// 不计入统计的预热次数
  #[arg(long, default_value_t = 2)]
  pub warmup: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测配置: {}", args.config);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = DetectConfig::from_url(&args.config)?;
  let input = InputWrapper::from_url(&args.input)?;
  let pipeline = DetectionPipeline::new(config)?;
  let output: OutputWrapper = OutputWrapper::from_url(&args.output)?;

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .with_warmup(args.warmup)
    .run_task(input, pipeline, output)?;

  Ok(())
}
