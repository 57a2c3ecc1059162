// 该文件是 Plyscan （板检） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use plyscan::{
  Record,
  analysis::CuttingAnalyzer,
  grid::{CaptureGrid, CropWindow, SurfaceSize},
  reproject::Reprojector,
  session::{Session, SurfaceOutcome},
  stacking::StackAllocator,
};

use args::{Args, Command};

fn report<T>(step: &str, outcomes: &[SurfaceOutcome<T>]) -> usize {
  let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
  println!(
    "{}: {} 个表面成功, {} 个失败",
    step,
    outcomes.len() - failed,
    failed
  );
  for outcome in outcomes {
    if let Err(e) = &outcome.result {
      println!("  - {}: {}", outcome.surface.name, e);
    }
  }
  failed
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let command = args.command.unwrap_or(Command::Run);

  let surface = SurfaceSize::new(args.surface_width, args.surface_height)?;
  let session = Session::open(&args.session)?;
  info!("会话目录: {}", session.root().display());

  let mut failed = 0;

  if command.reproject() {
    let grid = match args.sequence.clone() {
      Some(sequence) => CaptureGrid::new(args.grid_x, args.grid_y, sequence)?,
      None => CaptureGrid::row_major(args.grid_x, args.grid_y)?,
    };
    let reprojector = Reprojector::new(grid, surface, CropWindow::default());
    let outcomes = session.reproject_all(&reprojector, !args.no_images);
    failed += report("重投影", &outcomes);
  }

  if command.analyze() {
    let analyzer = CuttingAnalyzer::new(args.pieces_x, args.pieces_y, surface)?;
    let outcomes = session.analyze_all(&analyzer);
    failed += report("切割分析", &outcomes);
  }

  if command.stack() {
    let allocator =
      StackAllocator::with_capacity(args.pieces_x, args.pieces_y, args.strategy, args.capacity)?;
    info!(
      "堆叠方式 {}，每堆最多 {} 块",
      allocator.strategy(),
      allocator.capacity()
    );
    let surfaces = session.defect_summaries();
    let layout = allocator.allocate(&surfaces);
    let path = layout
      .save_to_dir(session.root())
      .context("无法写出堆叠方案")?;
    info!("堆叠方案已写入 {}", path.display());

    println!();
    println!("{}", allocator.summary(surface, &surfaces));
  }

  if failed > 0 {
    anyhow::bail!("{} 个表面处理失败", failed);
  }
  Ok(())
}
