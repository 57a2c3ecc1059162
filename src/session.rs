// 该文件是 Plyscan （板检） 项目的一部分。
// src/session.rs - 会话目录与批处理
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

//! 一个会话目录包含若干 `surface_*` 子目录，每个子目录是一个表面的全部拍摄结果。
//! 批处理中某个表面失败只会记录在它自己的结果里，不影响其余表面。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  Record, RecordError,
  analysis::{AnalysisError, CuttingAnalysis, CuttingAnalyzer},
  reproject::Reprojector,
  stacking::SurfaceDefects,
};

pub const SURFACE_PREFIX: &str = "surface_";

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("无法读取会话目录 {path}: {source}")]
  ReadDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("会话路径不是目录: {0}")]
  NotADirectory(PathBuf),
}

/// 处理单个表面时可能出现的错误
#[derive(Error, Debug)]
pub enum SurfaceError {
  #[error("{0}")]
  Record(#[from] RecordError),
  #[error("{0}")]
  Analysis(#[from] AnalysisError),
  #[cfg(feature = "stitch_image")]
  #[error("{0}")]
  Stitch(#[from] crate::stitch::StitchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceDir {
  pub name: String,
  pub path: PathBuf,
  /// 在会话中的序号，1 起始
  pub index: u32,
}

/// 批处理中一个表面的结果，失败时附带可读的原因
#[derive(Debug)]
pub struct SurfaceOutcome<T> {
  pub surface: SurfaceDir,
  pub result: Result<T, String>,
}

impl<T> SurfaceOutcome<T> {
  pub fn is_ok(&self) -> bool {
    self.result.is_ok()
  }
}

#[derive(Debug, Clone)]
pub struct Session {
  root: PathBuf,
  surfaces: Vec<SurfaceDir>,
}

impl Session {
  /// 路径本身以 `surface_` 开头时视为只有一个表面的会话
  pub fn open(root: &Path) -> Result<Self, SessionError> {
    if !root.is_dir() {
      return Err(SessionError::NotADirectory(root.to_path_buf()));
    }

    let own_name = root
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    if own_name.starts_with(SURFACE_PREFIX) {
      info!("单表面会话: {}", root.display());
      return Ok(Self {
        root: root.to_path_buf(),
        surfaces: vec![SurfaceDir {
          name: own_name,
          path: root.to_path_buf(),
          index: 1,
        }],
      });
    }

    let read_err = |source| SessionError::ReadDir {
      path: root.to_path_buf(),
      source,
    };
    let mut found = Vec::new();
    for entry in std::fs::read_dir(root).map_err(read_err)? {
      let entry = entry.map_err(read_err)?;
      let name = entry.file_name().to_string_lossy().into_owned();
      if name.starts_with(SURFACE_PREFIX) && entry.path().is_dir() {
        found.push((name, entry.path()));
      }
    }
    found.sort();

    let surfaces: Vec<SurfaceDir> = found
      .into_iter()
      .enumerate()
      .map(|(i, (name, path))| SurfaceDir {
        name,
        path,
        index: (i + 1) as u32,
      })
      .collect();
    info!("会话 {} 有 {} 个表面", root.display(), surfaces.len());

    Ok(Self {
      root: root.to_path_buf(),
      surfaces,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn surfaces(&self) -> &[SurfaceDir] {
    &self.surfaces
  }

  /// 重投影一个表面并写出 `defect_coordinates.json`，需要时同时生成拼接图与标注图。
  /// 返回缺陷数。
  pub fn reproject_surface(
    &self,
    surface: &SurfaceDir,
    reprojector: &Reprojector,
    render_images: bool,
  ) -> Result<usize, SurfaceError> {
    let coordinates = reprojector.reproject_surface(&surface.path)?;
    coordinates.save_to_dir(&surface.path)?;

    if render_images {
      render(surface, reprojector, &coordinates)?;
    }
    Ok(coordinates.defects.len())
  }

  pub fn reproject_all(
    &self,
    reprojector: &Reprojector,
    render_images: bool,
  ) -> Vec<SurfaceOutcome<usize>> {
    self.for_each_surface(|surface| {
      self
        .reproject_surface(surface, reprojector, render_images)
        .map_err(|e| e.to_string())
    })
  }

  pub fn analyze_all(&self, analyzer: &CuttingAnalyzer) -> Vec<SurfaceOutcome<CuttingAnalysis>> {
    self.for_each_surface(|surface| {
      analyzer
        .analyze_surface(&surface.path, surface.index)
        .map_err(|e| e.to_string())
    })
  }

  /// 读取每个表面的 `cutting_analysis.json`；读不到的按无缺陷处理，
  /// 保证堆的编号只由表面数量决定
  pub fn defect_summaries(&self) -> Vec<SurfaceDefects> {
    self
      .surfaces
      .iter()
      .map(
        |surface| match CuttingAnalysis::load_from_dir(&surface.path) {
          Ok(analysis) => SurfaceDefects::from_analysis(&surface.name, &analysis),
          Err(e) => {
            warn!("表面 {} 没有可用的切割分析，按无缺陷处理: {}", surface.name, e);
            SurfaceDefects::new(&surface.name, Vec::new())
          }
        },
      )
      .collect()
  }

  fn for_each_surface<T>(
    &self,
    mut process: impl FnMut(&SurfaceDir) -> Result<T, String>,
  ) -> Vec<SurfaceOutcome<T>> {
    self
      .surfaces
      .iter()
      .map(|surface| {
        let result = process(surface);
        if let Err(e) = &result {
          error!("表面 {} 处理失败: {}", surface.name, e);
        }
        SurfaceOutcome {
          surface: surface.clone(),
          result,
        }
      })
      .collect()
  }
}

#[cfg(feature = "stitch_image")]
fn render(
  surface: &SurfaceDir,
  reprojector: &Reprojector,
  coordinates: &crate::reproject::DefectCoordinates,
) -> Result<(), SurfaceError> {
  use crate::stitch::{STITCHED_FILE, Stitcher, save_jpeg};

  let canvas = Stitcher::from_reprojector(reprojector).stitch(&surface.path)?;
  save_jpeg(&canvas, &surface.path.join(STITCHED_FILE))?;

  #[cfg(feature = "label_image")]
  {
    use crate::stitch::{LABELED_FILE, Labeler};
    let labeled = Labeler::new().label(&canvas, &coordinates.defects);
    save_jpeg(&labeled, &surface.path.join(LABELED_FILE))?;
  }
  #[cfg(not(feature = "label_image"))]
  let _ = coordinates;

  Ok(())
}

#[cfg(not(feature = "stitch_image"))]
fn render(
  surface: &SurfaceDir,
  _reprojector: &Reprojector,
  _coordinates: &crate::reproject::DefectCoordinates,
) -> Result<(), SurfaceError> {
  warn!("未启用 stitch_image 特性，跳过表面 {} 的拼接图", surface.name);
  Ok(())
}
