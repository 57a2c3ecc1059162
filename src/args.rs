// 该文件是 Plyscan （板检） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use plyscan::stacking::{STACK_CAPACITY, StackingStrategy};

/// Plyscan 板面缺陷分析
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 会话目录（包含 surface_* 子目录），或单个 surface_* 目录
  #[arg(value_name = "SESSION")]
  pub session: PathBuf,

  /// 要执行的步骤，默认全部执行
  #[command(subcommand)]
  pub command: Option<Command>,

  /// 表面宽度（毫米）
  #[arg(long, default_value = "420", value_name = "MM")]
  pub surface_width: f64,

  /// 表面高度（毫米）
  #[arg(long, default_value = "297", value_name = "MM")]
  pub surface_height: f64,

  /// 拍摄网格列数
  #[arg(long, default_value = "3", value_name = "COUNT")]
  pub grid_x: u32,

  /// 拍摄网格行数
  #[arg(long, default_value = "3", value_name = "COUNT")]
  pub grid_y: u32,

  /// 拍摄序列，例如 3,4,9,2,5,8,1,6,7；默认按行优先
  #[arg(long, value_delimiter = ',', value_name = "LIST")]
  pub sequence: Option<Vec<u32>>,

  /// 横向切割块数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub pieces_x: u32,

  /// 纵向切割块数
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub pieces_y: u32,

  /// 堆叠方式: per-row 或 single
  #[arg(long, default_value_t = StackingStrategy::PerRow, value_name = "STRATEGY")]
  pub strategy: StackingStrategy,

  /// 每堆最多块数
  #[arg(long, default_value_t = STACK_CAPACITY, value_name = "COUNT")]
  pub capacity: usize,

  /// 重投影时不生成拼接图与标注图
  #[arg(long)]
  pub no_images: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  /// 重投影检测结果，写出 defect_coordinates.json
  Reproject,
  /// 分配缺陷到切割块，写出 cutting_analysis.json
  Analyze,
  /// 计算堆叠方案，写出 stack_layout.json
  Stack,
  /// 依次执行以上三步
  Run,
}

impl Command {
  pub fn reproject(&self) -> bool {
    matches!(self, Command::Reproject | Command::Run)
  }

  pub fn analyze(&self) -> bool {
    matches!(self, Command::Analyze | Command::Run)
  }

  pub fn stack(&self) -> bool {
    matches!(self, Command::Stack | Command::Run)
  }
}
