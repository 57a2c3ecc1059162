// 该文件是 Plyscan （板检） 项目的一部分。
// src/grid.rs - 拍摄网格、画布与物理坐标换算
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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::lenient;

// 相机原始画面与取景框
pub const CAMERA_FRAME_WIDTH: u32 = 1920;
pub const CAMERA_FRAME_HEIGHT: u32 = 1080;
pub const CROP_WIDTH: u32 = 970;
pub const CROP_HEIGHT: u32 = 686;

// A3
pub const DEFAULT_SURFACE_WIDTH: f64 = 420.0;
pub const DEFAULT_SURFACE_HEIGHT: f64 = 297.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
  #[error("拍摄网格尺寸无效: {cols}x{rows}")]
  EmptyCaptureGrid { cols: u32, rows: u32 },
  #[error("网格过大: {cols} x {rows}")]
  GridTooLarge { cols: u32, rows: u32 },
  #[error("拍摄序列长度不匹配: 期望 {expected}, 实际 {actual}")]
  SequenceLength { expected: usize, actual: usize },
  #[error("拍摄序列编号越界: {number} 不在 1..={max} 内")]
  SequenceOutOfRange { number: u32, max: u32 },
  #[error("拍摄序列编号重复: {0}")]
  SequenceDuplicate(u32),
  #[error("表面尺寸无效: {width} x {height} mm")]
  InvalidSurface { width: f64, height: f64 },
  #[error("切割网格尺寸无效: {x} x {y}")]
  EmptyPieceGrid { x: u32, y: u32 },
  #[error("无法解析切割块编号: {0}")]
  InvalidPieceId(String),
}

/// 拍摄网格中的单元格，0 起始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridCell {
  pub col: u32,
  pub row: u32,
}

/// 拍摄网格与拍摄序列
///
/// `sequence[i]` 是放在第 `i` 个位置上的图像编号。位置总是按行优先填充画布，
/// 与编号的选取方式无关。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureGrid {
  cols: u32,
  rows: u32,
  sequence: Vec<u32>,
}

impl CaptureGrid {
  /// 校验序列必须是 1..=cols·rows 的一个排列
  pub fn new(cols: u32, rows: u32, sequence: Vec<u32>) -> Result<Self, GridError> {
    if cols == 0 || rows == 0 {
      return Err(GridError::EmptyCaptureGrid { cols, rows });
    }

    let total = cols
      .checked_mul(rows)
      .ok_or(GridError::GridTooLarge { cols, rows })?;
    if sequence.len() != total as usize {
      return Err(GridError::SequenceLength {
        expected: total as usize,
        actual: sequence.len(),
      });
    }

    let mut seen = vec![false; total as usize];
    for &number in &sequence {
      if number == 0 || number > total {
        return Err(GridError::SequenceOutOfRange { number, max: total });
      }
      let slot = &mut seen[(number - 1) as usize];
      if *slot {
        return Err(GridError::SequenceDuplicate(number));
      }
      *slot = true;
    }

    Ok(Self {
      cols,
      rows,
      sequence,
    })
  }

  /// 按 1, 2, 3, ... 顺序拍摄
  pub fn row_major(cols: u32, rows: u32) -> Result<Self, GridError> {
    let total = cols
      .checked_mul(rows)
      .ok_or(GridError::GridTooLarge { cols, rows })?;
    Self::new(cols, rows, (1..=total).collect())
  }

  pub fn cols(&self) -> u32 {
    self.cols
  }

  pub fn rows(&self) -> u32 {
    self.rows
  }

  pub fn sequence(&self) -> &[u32] {
    &self.sequence
  }

  pub fn len(&self) -> usize {
    self.sequence.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sequence.is_empty()
  }

  pub fn cell_for_position(&self, position: usize) -> GridCell {
    let position = position as u32;
    GridCell {
      col: position % self.cols,
      row: position / self.cols,
    }
  }

  /// 依次给出 (位置, 图像编号, 单元格)
  pub fn tiles(&self) -> impl Iterator<Item = (usize, u32, GridCell)> + '_ {
    self
      .sequence
      .iter()
      .enumerate()
      .map(|(position, &number)| (position, number, self.cell_for_position(position)))
  }
}

/// 相机原始画面中居中裁剪出的取景框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
  pub frame_width: u32,
  pub frame_height: u32,
  pub crop_width: u32,
  pub crop_height: u32,
}

impl Default for CropWindow {
  fn default() -> Self {
    Self {
      frame_width: CAMERA_FRAME_WIDTH,
      frame_height: CAMERA_FRAME_HEIGHT,
      crop_width: CROP_WIDTH,
      crop_height: CROP_HEIGHT,
    }
  }
}

impl CropWindow {
  /// 取景框左上角在原始画面中的位置，整数除法
  pub fn offset(&self) -> (i64, i64) {
    (
      (self.frame_width as i64 - self.crop_width as i64) / 2,
      (self.frame_height as i64 - self.crop_height as i64) / 2,
    )
  }

  /// 原始画面坐标 -> 画布坐标
  pub fn to_canvas(&self, origin: (u32, u32), raw: (f64, f64)) -> (f64, f64) {
    let (dx, dy) = self.offset();
    (
      origin.0 as f64 + (raw.0 - dx as f64),
      origin.1 as f64 + (raw.1 - dy as f64),
    )
  }
}

/// 表面的物理尺寸（毫米）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
  pub width: f64,
  pub height: f64,
}

impl Default for SurfaceSize {
  fn default() -> Self {
    Self {
      width: DEFAULT_SURFACE_WIDTH,
      height: DEFAULT_SURFACE_HEIGHT,
    }
  }
}

impl SurfaceSize {
  pub fn new(width: f64, height: f64) -> Result<Self, GridError> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(width) || !valid(height) {
      return Err(GridError::InvalidSurface { width, height });
    }
    Ok(Self { width, height })
  }

  pub fn aspect_ratio(&self) -> f64 {
    self.width / self.height
  }

  /// 闭区间 [0, W] x [0, H]
  pub fn contains(&self, x: f64, y: f64) -> bool {
    x.is_finite() && y.is_finite() && x >= 0.0 && x <= self.width && y >= 0.0 && y <= self.height
  }
}

/// 拼接画布的像素尺寸与单元格划分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasLayout {
  width: u32,
  height: u32,
  cols: u32,
  rows: u32,
}

impl CanvasLayout {
  pub fn new(width: u32, height: u32, cols: u32, rows: u32) -> Self {
    Self {
      width,
      height,
      cols: cols.max(1),
      rows: rows.max(1),
    }
  }

  /// 宽度为 cols 个取景框宽，高度按表面宽高比推出
  pub fn for_surface(grid: &CaptureGrid, surface: SurfaceSize, crop: &CropWindow) -> Self {
    let width = grid.cols().saturating_mul(crop.crop_width);
    let height = (width as f64 / surface.aspect_ratio()) as u32;
    Self::new(width, height, grid.cols(), grid.rows())
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// 余下的像素直接丢弃
  pub fn cell_width(&self) -> u32 {
    self.width / self.cols
  }

  pub fn cell_height(&self) -> u32 {
    self.height / self.rows
  }

  pub fn cell_origin(&self, cell: GridCell) -> (u32, u32) {
    (cell.col * self.cell_width(), cell.row * self.cell_height())
  }

  /// 第 `position` 个拍摄位置在画布上的左上角
  pub fn origin_for_position(&self, position: usize) -> (u32, u32) {
    let position = position as u32;
    self.cell_origin(GridCell {
      col: position % self.cols,
      row: position / self.cols,
    })
  }
}

/// 中心点加宽高表示的矩形，画布（像素）与物理（毫米）两种坐标共用
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CenteredRect {
  #[serde(deserialize_with = "lenient::or_default")]
  pub x: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub y: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub width: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub height: f64,
}

impl CenteredRect {
  pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn left(&self) -> f64 {
    self.x - self.width / 2.0
  }

  pub fn right(&self) -> f64 {
    self.x + self.width / 2.0
  }

  pub fn top(&self) -> f64 {
    self.y - self.height / 2.0
  }

  pub fn bottom(&self) -> f64 {
    self.y + self.height / 2.0
  }

  /// 四个角点与中心点
  pub fn sample_points(&self) -> [(f64, f64); 5] {
    [
      (self.left(), self.top()),
      (self.right(), self.top()),
      (self.left(), self.bottom()),
      (self.right(), self.bottom()),
      (self.x, self.y),
    ]
  }
}

/// 画布像素 -> 物理毫米，两个轴独立缩放
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalScale {
  x: f64,
  y: f64,
}

impl PhysicalScale {
  pub fn new(canvas: &CanvasLayout, surface: SurfaceSize) -> Self {
    Self {
      x: surface.width / canvas.width().max(1) as f64,
      y: surface.height / canvas.height().max(1) as f64,
    }
  }

  pub fn to_physical(&self, rect: &CenteredRect) -> CenteredRect {
    CenteredRect {
      x: rect.x * self.x,
      y: rect.y * self.y,
      width: rect.width * self.x,
      height: rect.height * self.y,
    }
  }
}

/// 切割块编号，两个分量都从 1 开始，文本形式为 `x{X}y{Y}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceId {
  pub x: u32,
  pub y: u32,
}

impl PieceId {
  pub fn new(x: u32, y: u32) -> Self {
    Self { x, y }
  }
}

impl fmt::Display for PieceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "x{}y{}", self.x, self.y)
  }
}

impl FromStr for PieceId {
  type Err = GridError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || GridError::InvalidPieceId(s.to_string());
    let rest = s.strip_prefix('x').ok_or_else(invalid)?;
    let (x, y) = rest.split_once('y').ok_or_else(invalid)?;
    Ok(PieceId {
      x: x.parse().map_err(|_| invalid())?,
      y: y.parse().map_err(|_| invalid())?,
    })
  }
}

impl Serialize for PieceId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for PieceId {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(serde::de::Error::custom)
  }
}

/// 表面上的切割网格
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieceGrid {
  surface: SurfaceSize,
  pieces_in_x: u32,
  pieces_in_y: u32,
}

impl PieceGrid {
  pub fn new(surface: SurfaceSize, pieces_in_x: u32, pieces_in_y: u32) -> Result<Self, GridError> {
    if pieces_in_x == 0 || pieces_in_y == 0 {
      return Err(GridError::EmptyPieceGrid {
        x: pieces_in_x,
        y: pieces_in_y,
      });
    }
    if pieces_in_x.checked_mul(pieces_in_y).is_none() {
      return Err(GridError::GridTooLarge {
        cols: pieces_in_x,
        rows: pieces_in_y,
      });
    }
    Ok(Self {
      surface,
      pieces_in_x,
      pieces_in_y,
    })
  }

  pub fn surface(&self) -> SurfaceSize {
    self.surface
  }

  pub fn pieces_in_x(&self) -> u32 {
    self.pieces_in_x
  }

  pub fn pieces_in_y(&self) -> u32 {
    self.pieces_in_y
  }

  pub fn piece_count(&self) -> usize {
    self.pieces_in_x as usize * self.pieces_in_y as usize
  }

  pub fn piece_width(&self) -> f64 {
    self.surface.width / self.pieces_in_x as f64
  }

  pub fn piece_height(&self) -> f64 {
    self.surface.height / self.pieces_in_y as f64
  }

  /// 物理坐标所在的切割块；落在表面之外时返回 `None`。
  /// 恰好在远端边缘上的点归入最后一块。
  pub fn piece_at(&self, x: f64, y: f64) -> Option<PieceId> {
    if !self.surface.contains(x, y) {
      return None;
    }
    let px = ((x / self.piece_width()).floor() as u32 + 1).min(self.pieces_in_x);
    let py = ((y / self.piece_height()).floor() as u32 + 1).min(self.pieces_in_y);
    Some(PieceId::new(px, py))
  }

  /// 按 x 外层、y 内层的顺序列出所有切割块
  pub fn piece_ids(&self) -> impl Iterator<Item = PieceId> {
    let pieces_in_y = self.pieces_in_y;
    (1..=self.pieces_in_x).flat_map(move |x| (1..=pieces_in_y).map(move |y| PieceId::new(x, y)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sequence_must_be_a_permutation() {
    assert!(CaptureGrid::new(3, 3, vec![3, 4, 9, 2, 5, 8, 1, 6, 7]).is_ok());
    assert_eq!(
      CaptureGrid::new(3, 3, vec![1, 2, 3]),
      Err(GridError::SequenceLength {
        expected: 9,
        actual: 3
      })
    );
    assert_eq!(
      CaptureGrid::new(2, 2, vec![1, 2, 2, 4]),
      Err(GridError::SequenceDuplicate(2))
    );
    assert_eq!(
      CaptureGrid::new(2, 2, vec![0, 1, 2, 3]),
      Err(GridError::SequenceOutOfRange { number: 0, max: 4 })
    );
    assert_eq!(
      CaptureGrid::new(0, 2, vec![]),
      Err(GridError::EmptyCaptureGrid { cols: 0, rows: 2 })
    );
    assert_eq!(
      CaptureGrid::new(70000, 70000, vec![1]),
      Err(GridError::GridTooLarge {
        cols: 70000,
        rows: 70000
      })
    );
    assert!(CaptureGrid::row_major(70000, 70000).is_err());
  }

  #[test]
  fn positions_fill_rows_first_regardless_of_numbers() {
    let grid = CaptureGrid::new(3, 3, vec![3, 4, 9, 2, 5, 8, 1, 6, 7]).unwrap();
    let tiles: Vec<_> = grid.tiles().collect();
    assert_eq!(tiles[0], (0, 3, GridCell { col: 0, row: 0 }));
    assert_eq!(tiles[2], (2, 9, GridCell { col: 2, row: 0 }));
    assert_eq!(tiles[3], (3, 2, GridCell { col: 0, row: 1 }));
    assert_eq!(tiles[8], (8, 7, GridCell { col: 2, row: 2 }));
  }

  #[test]
  fn canvas_follows_surface_aspect_ratio() {
    let grid = CaptureGrid::row_major(3, 3).unwrap();
    let layout = CanvasLayout::for_surface(&grid, SurfaceSize::default(), &CropWindow::default());
    assert_eq!(layout.width(), 2910);
    assert_eq!(layout.height(), 2057);
    assert_eq!(layout.cell_width(), 970);
    assert_eq!(layout.cell_height(), 685);
    assert_eq!(layout.origin_for_position(0), (0, 0));
    assert_eq!(layout.origin_for_position(4), (970, 685));
    assert_eq!(layout.origin_for_position(8), (1940, 1370));
  }

  #[test]
  fn crop_offset_moves_detections_into_the_cell() {
    let crop = CropWindow::default();
    assert_eq!(crop.offset(), (475, 197));
    assert_eq!(crop.to_canvas((0, 0), (960.0, 540.0)), (485.0, 343.0));
    assert_eq!(crop.to_canvas((970, 685), (960.0, 540.0)), (1455.0, 1028.0));
  }

  #[test]
  fn physical_scale_is_per_axis() {
    let layout = CanvasLayout::new(2000, 1000, 2, 2);
    let scale = PhysicalScale::new(&layout, SurfaceSize::new(400.0, 300.0).unwrap());
    let rect = scale.to_physical(&CenteredRect::new(1000.0, 500.0, 100.0, 100.0));
    assert_eq!(rect, CenteredRect::new(200.0, 150.0, 20.0, 30.0));
  }

  #[test]
  fn piece_index_is_clamped_on_the_far_edge() {
    let grid = PieceGrid::new(SurfaceSize::default(), 4, 2).unwrap();
    assert_eq!(grid.piece_at(0.0, 0.0), Some(PieceId::new(1, 1)));
    assert_eq!(grid.piece_at(104.9, 148.0), Some(PieceId::new(1, 1)));
    assert_eq!(grid.piece_at(105.0, 148.5), Some(PieceId::new(2, 2)));
    assert_eq!(grid.piece_at(420.0, 297.0), Some(PieceId::new(4, 2)));
    assert_eq!(grid.piece_at(-0.1, 10.0), None);
    assert_eq!(grid.piece_at(10.0, 297.1), None);
    assert_eq!(grid.piece_at(f64::NAN, 10.0), None);
  }

  #[test]
  fn piece_index_stays_in_range_across_the_surface() {
    let grid = PieceGrid::new(SurfaceSize::new(100.0, 70.0).unwrap(), 3, 7).unwrap();
    for i in 0..=200 {
      for j in 0..=140 {
        let id = grid.piece_at(i as f64 * 0.5, j as f64 * 0.5).unwrap();
        assert!((1..=3).contains(&id.x), "x out of range: {id}");
        assert!((1..=7).contains(&id.y), "y out of range: {id}");
      }
    }
  }

  #[test]
  fn piece_ids_round_trip_through_text() {
    let id: PieceId = "x12y3".parse().unwrap();
    assert_eq!(id, PieceId::new(12, 3));
    assert_eq!(id.to_string(), "x12y3");
    assert!("y1x2".parse::<PieceId>().is_err());
    assert!("x1".parse::<PieceId>().is_err());
    assert!("xay2".parse::<PieceId>().is_err());
  }

  #[test]
  fn piece_ids_are_listed_column_by_column() {
    let grid = PieceGrid::new(SurfaceSize::default(), 2, 2).unwrap();
    let ids: Vec<String> = grid.piece_ids().map(|id| id.to_string()).collect();
    assert_eq!(ids, ["x1y1", "x1y2", "x2y1", "x2y2"]);
    assert_eq!(grid.piece_count(), 4);
  }

  #[test]
  fn oversized_piece_grid_is_rejected() {
    assert_eq!(
      PieceGrid::new(SurfaceSize::default(), 70000, 70000),
      Err(GridError::GridTooLarge {
        cols: 70000,
        rows: 70000
      })
    );
  }
}
