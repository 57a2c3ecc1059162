// 该文件是 Plyscan （板检） 项目的一部分。
// src/analysis.rs - 缺陷到切割块的分配
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  Record, RecordError,
  grid::{CenteredRect, GridError, PieceGrid, PieceId, SurfaceSize},
  lenient,
  reproject::{DefectCoordinates, PhysicalDefect},
  surface::{Piece, Surface},
};

#[derive(Error, Debug)]
pub enum AnalysisError {
  #[error("记录错误: {0}")]
  Record(#[from] RecordError),
  #[error("网格错误: {0}")]
  Grid(#[from] GridError),
}

/// 一个缺陷影响到的切割块
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
  /// 去重后按首次命中的顺序排列
  pub pieces: Vec<PieceId>,
  pub outside: bool,
}

/// 五点采样：四个角点与中心点，落在表面之外的采样点直接丢弃
pub fn assign(rect: &CenteredRect, grid: &PieceGrid) -> Assignment {
  let mut pieces = Vec::new();
  for (x, y) in rect.sample_points() {
    if let Some(id) = grid.piece_at(x, y)
      && !pieces.contains(&id)
    {
      pieces.push(id);
    }
  }
  let outside = pieces.is_empty();
  Assignment { pieces, outside }
}

impl Surface {
  /// 重新分配全部缺陷，之前的结果会被清空
  pub fn assign_defects(&mut self, defects: &[PhysicalDefect], surface_index: u32) {
    self.clear();
    for defect in defects {
      let enriched = defect.with_surface_index(surface_index);
      let assignment = assign(&defect.physical_position, self.grid());
      if assignment.outside {
        debug!(
          "缺陷 {} ({}) 在表面之外",
          enriched.kind, enriched.source_image
        );
        self.push_outside(enriched);
        continue;
      }
      for id in assignment.pieces {
        self.push_defect(id, enriched.clone());
      }
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisMetadata {
  #[serde(deserialize_with = "lenient::or_default")]
  pub surface_name: String,
  #[serde(deserialize_with = "lenient::integer")]
  pub pieces_in_x: u32,
  #[serde(deserialize_with = "lenient::integer")]
  pub pieces_in_y: u32,
  #[serde(deserialize_with = "lenient::or_default")]
  pub surface_width: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub surface_height: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub piece_width: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub piece_height: f64,
}

/// `cutting_analysis.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuttingAnalysis {
  #[serde(deserialize_with = "lenient::or_default")]
  pub metadata: AnalysisMetadata,
  #[serde(deserialize_with = "lenient::seq")]
  pub pieces: Vec<Piece>,
  #[serde(deserialize_with = "lenient::seq")]
  pub pieces_with_defects: Vec<String>,
  #[serde(deserialize_with = "lenient::seq")]
  pub outside_defects: Vec<PhysicalDefect>,
}

impl Record for CuttingAnalysis {
  const FILE_NAME: &'static str = "cutting_analysis.json";
}

impl CuttingAnalysis {
  pub fn from_surface(surface: &Surface, name: &str) -> Self {
    let grid = surface.grid();
    Self {
      metadata: AnalysisMetadata {
        surface_name: name.to_string(),
        pieces_in_x: grid.pieces_in_x(),
        pieces_in_y: grid.pieces_in_y(),
        surface_width: grid.surface().width,
        surface_height: grid.surface().height,
        piece_width: grid.piece_width(),
        piece_height: grid.piece_height(),
      },
      pieces: surface.pieces().to_vec(),
      pieces_with_defects: surface
        .pieces_with_defects()
        .iter()
        .map(PieceId::to_string)
        .collect(),
      outside_defects: surface.outside_defects().to_vec(),
    }
  }

  /// 所有切割块上的缺陷条目数（跨块重复计数）
  pub fn defect_entries(&self) -> usize {
    self.pieces.iter().map(|piece| piece.defects.len()).sum()
  }
}

/// 读取 `defect_coordinates.json`，按切割网格分配缺陷并写出 `cutting_analysis.json`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuttingAnalyzer {
  pub pieces_in_x: u32,
  pub pieces_in_y: u32,
  /// 坐标文件里的表面尺寸无效时使用
  pub fallback_surface: SurfaceSize,
}

impl Default for CuttingAnalyzer {
  fn default() -> Self {
    Self {
      pieces_in_x: 4,
      pieces_in_y: 2,
      fallback_surface: SurfaceSize::default(),
    }
  }
}

impl CuttingAnalyzer {
  pub fn new(
    pieces_in_x: u32,
    pieces_in_y: u32,
    fallback_surface: SurfaceSize,
  ) -> Result<Self, GridError> {
    PieceGrid::new(fallback_surface, pieces_in_x, pieces_in_y)?;
    Ok(Self {
      pieces_in_x,
      pieces_in_y,
      fallback_surface,
    })
  }

  pub fn analyze(
    &self,
    coordinates: &DefectCoordinates,
    name: &str,
    surface_index: u32,
  ) -> Result<CuttingAnalysis, GridError> {
    let size = coordinates.surface_size().unwrap_or_else(|| {
      warn!(
        "表面 {} 的尺寸无效 ({} x {})，使用 {} x {} mm",
        name,
        coordinates.surface_width,
        coordinates.surface_height,
        self.fallback_surface.width,
        self.fallback_surface.height
      );
      self.fallback_surface
    });

    let grid = PieceGrid::new(size, self.pieces_in_x, self.pieces_in_y)?;
    let mut surface = Surface::new(grid);
    surface.assign_defects(&coordinates.defects, surface_index);
    Ok(CuttingAnalysis::from_surface(&surface, name))
  }

  pub fn analyze_surface(
    &self,
    dir: &Path,
    surface_index: u32,
  ) -> Result<CuttingAnalysis, AnalysisError> {
    let name = dir
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    let coordinates = DefectCoordinates::load_from_dir(dir)?;
    let analysis = self.analyze(&coordinates, &name, surface_index)?;
    let path = analysis.save_to_dir(dir)?;

    info!(
      "表面 {}: {} 个缺陷, {} 个切割块有缺陷, {} 个在表面之外, 写入 {}",
      name,
      coordinates.defects.len(),
      analysis.pieces_with_defects.len(),
      analysis.outside_defects.len(),
      path.display()
    );
    Ok(analysis)
  }
}
