// 该文件是 Plyscan （板检） 项目的一部分。
// src/reproject.rs - 检测框重投影到画布与物理坐标
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
use tracing::{debug, info};

use crate::{
  Record, RecordError,
  detection::{Detection, TileDetections, tile_detections_name, tile_image_name},
  grid::{CanvasLayout, CaptureGrid, CenteredRect, CropWindow, PhysicalScale, SurfaceSize},
  lenient,
};

/// 重投影后的缺陷，同时记录画布坐标（像素）与物理坐标（毫米），均为中心点加宽高
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalDefect {
  #[serde(deserialize_with = "lenient::or_default")]
  pub source_image: String,
  #[serde(deserialize_with = "lenient::integer")]
  pub sequence_number: u32,
  #[serde(rename = "type", deserialize_with = "lenient::or_default")]
  pub kind: String,
  #[serde(deserialize_with = "lenient::or_default")]
  pub confidence: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub canvas_position: CenteredRect,
  #[serde(deserialize_with = "lenient::or_default")]
  pub physical_position: CenteredRect,
  /// 切割分析时写入，表面在会话中的序号（1 起始）
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::or_default"
  )]
  pub surface_index: Option<u32>,
}

impl PhysicalDefect {
  pub fn with_surface_index(&self, surface_index: u32) -> Self {
    Self {
      surface_index: Some(surface_index),
      ..self.clone()
    }
  }
}

/// `defect_coordinates.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefectCoordinates {
  #[serde(deserialize_with = "lenient::or_default")]
  pub surface_width: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub surface_height: f64,
  #[serde(deserialize_with = "lenient::integer")]
  pub grid_x: u32,
  #[serde(deserialize_with = "lenient::integer")]
  pub grid_y: u32,
  #[serde(deserialize_with = "lenient::seq")]
  pub sequence: Vec<u32>,
  #[serde(deserialize_with = "lenient::seq")]
  pub defects: Vec<PhysicalDefect>,
}

impl Record for DefectCoordinates {
  const FILE_NAME: &'static str = "defect_coordinates.json";
}

impl DefectCoordinates {
  /// 记录的表面尺寸无效时返回 `None`
  pub fn surface_size(&self) -> Option<SurfaceSize> {
    SurfaceSize::new(self.surface_width, self.surface_height).ok()
  }
}

/// 将每张图像的检测框放到画布上，再换算成表面上的物理坐标
#[derive(Debug, Clone)]
pub struct Reprojector {
  grid: CaptureGrid,
  layout: CanvasLayout,
  crop: CropWindow,
  surface: SurfaceSize,
  scale: PhysicalScale,
}

impl Reprojector {
  pub fn new(grid: CaptureGrid, surface: SurfaceSize, crop: CropWindow) -> Self {
    let layout = CanvasLayout::for_surface(&grid, surface, &crop);
    Self::with_layout(grid, layout, surface, crop)
  }

  pub fn with_layout(
    grid: CaptureGrid,
    layout: CanvasLayout,
    surface: SurfaceSize,
    crop: CropWindow,
  ) -> Self {
    let scale = PhysicalScale::new(&layout, surface);
    Self {
      grid,
      layout,
      crop,
      surface,
      scale,
    }
  }

  pub fn grid(&self) -> &CaptureGrid {
    &self.grid
  }

  pub fn layout(&self) -> &CanvasLayout {
    &self.layout
  }

  pub fn crop(&self) -> &CropWindow {
    &self.crop
  }

  /// 返回 (画布矩形, 物理矩形)
  pub fn reproject_detection(
    &self,
    position: usize,
    detection: &Detection,
  ) -> (CenteredRect, CenteredRect) {
    let origin = self.layout.origin_for_position(position);
    let (x, y) = self.crop.to_canvas(origin, detection.center());
    let canvas = CenteredRect::new(x, y, detection.width, detection.height);
    (canvas, self.scale.to_physical(&canvas))
  }

  /// 第 `position` 个拍摄位置上的所有检测框
  pub fn reproject_tile(&self, position: usize, detections: &[Detection]) -> Vec<PhysicalDefect> {
    let Some(&number) = self.grid.sequence().get(position) else {
      debug!("拍摄位置 {} 超出网格，忽略", position);
      return Vec::new();
    };

    let source_image = tile_image_name(number);
    detections
      .iter()
      .map(|detection| {
        let (canvas_position, physical_position) = self.reproject_detection(position, detection);
        PhysicalDefect {
          source_image: source_image.clone(),
          sequence_number: number,
          kind: detection.class_name.clone(),
          confidence: detection.confidence,
          canvas_position,
          physical_position,
          surface_index: None,
        }
      })
      .collect()
  }

  /// 读取表面目录下所有图像的检测结果；缺失的检测文件按无检测处理
  pub fn reproject_surface(&self, dir: &Path) -> Result<DefectCoordinates, RecordError> {
    let mut defects = Vec::new();
    for (position, number, _) in self.grid.tiles() {
      let path = dir.join(tile_detections_name(number));
      let Some(tile) = TileDetections::read(&path)? else {
        continue;
      };
      debug!("图像 {} 有 {} 个检测框", number, tile.len());
      defects.extend(self.reproject_tile(position, &tile.detections));
    }

    info!("表面 {} 共重投影 {} 个缺陷", dir.display(), defects.len());
    Ok(self.coordinates(defects))
  }

  pub fn coordinates(&self, defects: Vec<PhysicalDefect>) -> DefectCoordinates {
    DefectCoordinates {
      surface_width: self.surface.width,
      surface_height: self.surface.height,
      grid_x: self.grid.cols(),
      grid_y: self.grid.rows(),
      sequence: self.grid.sequence().to_vec(),
      defects,
    }
  }
}
