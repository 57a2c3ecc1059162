// 该文件是 Plyscan （板检） 项目的一部分。
// src/surface.rs - 表面与切割块
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

use serde::{Deserialize, Serialize};

use crate::{
  grid::{PieceGrid, PieceId},
  lenient,
  reproject::PhysicalDefect,
};

/// 一个切割块，持有与它重叠的缺陷的副本
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Piece {
  #[serde(deserialize_with = "lenient::integer")]
  pub x: u32,
  #[serde(deserialize_with = "lenient::integer")]
  pub y: u32,
  #[serde(deserialize_with = "lenient::seq")]
  pub defects: Vec<PhysicalDefect>,
}

impl Piece {
  pub fn new(id: PieceId) -> Self {
    Self {
      x: id.x,
      y: id.y,
      defects: Vec::new(),
    }
  }

  pub fn id(&self) -> PieceId {
    PieceId::new(self.x, self.y)
  }

  pub fn has_defects(&self) -> bool {
    !self.defects.is_empty()
  }
}

/// 一次分析中的表面：切割网格上的全部切割块，以及落在表面之外的缺陷
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
  grid: PieceGrid,
  pieces: Vec<Piece>,
  outside: Vec<PhysicalDefect>,
}

impl Surface {
  pub fn new(grid: PieceGrid) -> Self {
    let mut pieces = Vec::with_capacity(grid.piece_count());
    pieces.extend(grid.piece_ids().map(Piece::new));
    Self {
      grid,
      pieces,
      outside: Vec::new(),
    }
  }

  pub fn grid(&self) -> &PieceGrid {
    &self.grid
  }

  /// x 外层、y 内层
  pub fn pieces(&self) -> &[Piece] {
    &self.pieces
  }

  pub fn piece(&self, id: PieceId) -> Option<&Piece> {
    self.index_of(id).map(|index| &self.pieces[index])
  }

  pub fn outside_defects(&self) -> &[PhysicalDefect] {
    &self.outside
  }

  pub fn pieces_with_defects(&self) -> Vec<PieceId> {
    self
      .pieces
      .iter()
      .filter(|piece| piece.has_defects())
      .map(Piece::id)
      .collect()
  }

  /// 清空所有切割块和表面外的缺陷
  pub fn clear(&mut self) {
    for piece in &mut self.pieces {
      piece.defects.clear();
    }
    self.outside.clear();
  }

  pub(crate) fn push_defect(&mut self, id: PieceId, defect: PhysicalDefect) {
    if let Some(index) = self.index_of(id) {
      self.pieces[index].defects.push(defect);
    }
  }

  pub(crate) fn push_outside(&mut self, defect: PhysicalDefect) {
    self.outside.push(defect);
  }

  fn index_of(&self, id: PieceId) -> Option<usize> {
    let (nx, ny) = (self.grid.pieces_in_x(), self.grid.pieces_in_y());
    if id.x == 0 || id.y == 0 || id.x > nx || id.y > ny {
      return None;
    }
    Some(((id.x - 1) * ny + (id.y - 1)) as usize)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grid::SurfaceSize;

  fn surface() -> Surface {
    Surface::new(PieceGrid::new(SurfaceSize::default(), 4, 2).unwrap())
  }

  #[test]
  fn every_cell_has_a_piece() {
    let surface = surface();
    assert_eq!(surface.pieces().len(), 8);
    assert_eq!(surface.pieces().len(), surface.grid().piece_count());
    let ids: Vec<String> = surface.pieces().iter().map(|p| p.id().to_string()).collect();
    assert_eq!(
      ids,
      ["x1y1", "x1y2", "x2y1", "x2y2", "x3y1", "x3y2", "x4y1", "x4y2"]
    );
  }

  #[test]
  fn lookup_matches_storage_order() {
    let surface = surface();
    for piece in surface.pieces() {
      assert_eq!(surface.piece(piece.id()), Some(piece));
    }
    assert!(surface.piece(PieceId::new(5, 1)).is_none());
    assert!(surface.piece(PieceId::new(0, 1)).is_none());
  }

  #[test]
  fn clear_drops_everything() {
    let mut surface = surface();
    surface.push_defect(PieceId::new(3, 2), PhysicalDefect::default());
    surface.push_outside(PhysicalDefect::default());
    assert_eq!(surface.pieces_with_defects(), vec![PieceId::new(3, 2)]);

    surface.clear();
    assert!(surface.pieces_with_defects().is_empty());
    assert!(surface.outside_defects().is_empty());
  }
}
