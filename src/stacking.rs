// 该文件是 Plyscan （板检） 项目的一部分。
// src/stacking.rs - 切割块的堆叠分配
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

//! 整个会话的切割块被码放成若干堆，每堆最多 [`STACK_CAPACITY`] 块。
//!
//! 每一块落在哪一堆、第几层都由 [`StackAllocator::placement`] 从输入直接算出，
//! 不依赖任何累积状态，所以以任意顺序重复计算结果都相同。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  Record,
  analysis::CuttingAnalysis,
  grid::{PieceGrid, PieceId, SurfaceSize},
};

pub const STACK_CAPACITY: usize = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackingError {
  #[error("切割网格尺寸无效: {x} x {y}")]
  EmptyGrid { x: u32, y: u32 },
  #[error("切割网格过大: {x} x {y}")]
  GridTooLarge { x: u32, y: u32 },
  #[error("堆叠容量必须大于 0")]
  ZeroCapacity,
  #[error("一行有 {pieces_in_x} 块，超过了单堆容量 {capacity}")]
  RowExceedsCapacity { pieces_in_x: u32, capacity: usize },
  #[error("未知的堆叠方式: {0}")]
  UnknownStrategy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackingStrategy {
  /// 同一行 (相同 y) 的切割块放在同一堆
  #[default]
  PerRow,
  /// 所有切割块依次放入一个接一个的堆
  Single,
}

impl StackingStrategy {
  pub fn label(&self) -> &'static str {
    match self {
      StackingStrategy::PerRow => "X-axis",
      StackingStrategy::Single => "Single Stack",
    }
  }
}

impl fmt::Display for StackingStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StackingStrategy::PerRow => write!(f, "per-row"),
      StackingStrategy::Single => write!(f, "single"),
    }
  }
}

impl FromStr for StackingStrategy {
  type Err = StackingError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "per-row" | "x-axis" | "row" => Ok(StackingStrategy::PerRow),
      "single" => Ok(StackingStrategy::Single),
      _ => Err(StackingError::UnknownStrategy(s.to_string())),
    }
  }
}

/// 堆中的一块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
  /// 1 起始
  pub surface_index: u32,
  pub piece: PieceId,
  pub has_defect: bool,
  /// 报告中使用的层号，1 起始
  pub position: usize,
}

impl fmt::Display for StackEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "s{}{}", self.surface_index, self.piece)?;
    if self.has_defect {
      write!(f, "D")?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
  pub number: usize,
  pub capacity: usize,
  pub entries: Vec<StackEntry>,
}

impl Stack {
  pub fn new(number: usize, capacity: usize) -> Self {
    Self {
      number,
      capacity,
      entries: Vec::new(),
    }
  }

  /// 堆满后什么也不做，返回 `false`
  pub fn push(&mut self, entry: StackEntry) -> bool {
    if self.is_full() {
      debug!("堆 {} 已满，丢弃 {}", self.number, entry);
      return false;
    }
    self.entries.push(entry);
    true
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn is_full(&self) -> bool {
    self.entries.len() >= self.capacity
  }
}

/// 一个表面的有缺陷切割块，来自 `cutting_analysis.json`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceDefects {
  pub name: String,
  pub pieces_with_defects: Vec<String>,
}

impl SurfaceDefects {
  pub fn new(name: impl Into<String>, pieces_with_defects: Vec<String>) -> Self {
    Self {
      name: name.into(),
      pieces_with_defects,
    }
  }

  pub fn from_analysis(name: impl Into<String>, analysis: &CuttingAnalysis) -> Self {
    Self::new(name, analysis.pieces_with_defects.clone())
  }

  /// 与 `x{X}y{Y}` 文本逐字比较
  pub fn has_defect(&self, piece: PieceId) -> bool {
    let id = piece.to_string();
    self.pieces_with_defects.iter().any(|p| *p == id)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
  pub stack: usize,
  pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackAllocator {
  pieces_in_x: u32,
  pieces_in_y: u32,
  strategy: StackingStrategy,
  capacity: usize,
}

impl StackAllocator {
  pub fn new(
    pieces_in_x: u32,
    pieces_in_y: u32,
    strategy: StackingStrategy,
  ) -> Result<Self, StackingError> {
    Self::with_capacity(pieces_in_x, pieces_in_y, strategy, STACK_CAPACITY)
  }

  pub fn with_capacity(
    pieces_in_x: u32,
    pieces_in_y: u32,
    strategy: StackingStrategy,
    capacity: usize,
  ) -> Result<Self, StackingError> {
    if pieces_in_x == 0 || pieces_in_y == 0 {
      return Err(StackingError::EmptyGrid {
        x: pieces_in_x,
        y: pieces_in_y,
      });
    }
    if pieces_in_x.checked_mul(pieces_in_y).is_none() {
      return Err(StackingError::GridTooLarge {
        x: pieces_in_x,
        y: pieces_in_y,
      });
    }
    if capacity == 0 {
      return Err(StackingError::ZeroCapacity);
    }
    if strategy == StackingStrategy::PerRow && pieces_in_x as usize > capacity {
      return Err(StackingError::RowExceedsCapacity {
        pieces_in_x,
        capacity,
      });
    }
    Ok(Self {
      pieces_in_x,
      pieces_in_y,
      strategy,
      capacity,
    })
  }

  pub fn strategy(&self) -> StackingStrategy {
    self.strategy
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn pieces_per_surface(&self) -> usize {
    self.pieces_in_x as usize * self.pieces_in_y as usize
  }

  /// 按行堆叠时，一组堆能容纳的表面数
  pub fn surfaces_per_group(&self) -> usize {
    self.capacity / self.pieces_in_x as usize
  }

  /// 按行堆叠时需要的组数
  pub fn groups_needed(&self, surfaces: usize) -> usize {
    surfaces.div_ceil(self.surfaces_per_group().max(1))
  }

  pub fn stack_count(&self, surfaces: usize) -> usize {
    match self.strategy {
      StackingStrategy::PerRow => self.groups_needed(surfaces) * self.pieces_in_y as usize,
      StackingStrategy::Single => (surfaces * self.pieces_per_surface()).div_ceil(self.capacity),
    }
  }

  /// 第 `surface_index` 个表面（1 起始）上的切割块所在的堆与层号。
  /// 表面编号为 0 或切割块不在网格内时返回 `None`。
  pub fn placement(&self, surface_index: u32, piece: PieceId) -> Option<Placement> {
    if surface_index == 0
      || piece.x == 0
      || piece.y == 0
      || piece.x > self.pieces_in_x
      || piece.y > self.pieces_in_y
    {
      return None;
    }

    let surface = (surface_index - 1) as usize;
    let (x, y) = (piece.x as usize, piece.y as usize);
    let (nx, ny) = (self.pieces_in_x as usize, self.pieces_in_y as usize);

    let placement = match self.strategy {
      StackingStrategy::PerRow => {
        let per_group = self.surfaces_per_group();
        let group = surface / per_group;
        let surface_in_group = surface % per_group;
        Placement {
          stack: y + group * ny,
          // x=1 在最上层
          position: surface_in_group * nx + (nx - x + 1),
        }
      }
      StackingStrategy::Single => {
        let index = surface * nx * ny + (y - 1) * nx + (x - 1);
        Placement {
          stack: index / self.capacity + 1,
          position: index % self.capacity + 1,
        }
      }
    };
    Some(placement)
  }

  /// 按插入顺序排出所有堆
  pub fn allocate(&self, surfaces: &[SurfaceDefects]) -> StackLayout {
    let mut stacks: Vec<Stack> = (1..=self.stack_count(surfaces.len()))
      .map(|number| Stack::new(number, self.capacity))
      .collect();

    for (surface_index, piece, defects) in self.insertion_order(surfaces) {
      let Some(placement) = self.placement(surface_index, piece) else {
        continue;
      };
      let entry = StackEntry {
        surface_index,
        piece,
        has_defect: defects.has_defect(piece),
        position: placement.position,
      };
      match stacks.get_mut(placement.stack - 1) {
        Some(stack) => {
          stack.push(entry);
        }
        None => warn!("堆 {} 不存在，丢弃 {}", placement.stack, entry),
      }
    }

    StackLayout {
      strategy: self.strategy,
      capacity: self.capacity,
      pieces_in_x: self.pieces_in_x,
      pieces_in_y: self.pieces_in_y,
      surfaces: surfaces.len(),
      stacks,
    }
  }

  fn insertion_order<'a>(
    &self,
    surfaces: &'a [SurfaceDefects],
  ) -> Vec<(u32, PieceId, &'a SurfaceDefects)> {
    let (nx, ny) = (self.pieces_in_x, self.pieces_in_y);
    let mut order = Vec::with_capacity(surfaces.len() * self.pieces_per_surface());
    match self.strategy {
      StackingStrategy::PerRow => {
        let per_group = self.surfaces_per_group();
        for (group, chunk) in surfaces.chunks(per_group).enumerate() {
          for y in 1..=ny {
            for (offset, defects) in chunk.iter().enumerate() {
              let surface_index = (group * per_group + offset + 1) as u32;
              for x in 1..=nx {
                order.push((surface_index, PieceId::new(x, y), defects));
              }
            }
          }
        }
      }
      StackingStrategy::Single => {
        for (offset, defects) in surfaces.iter().enumerate() {
          for y in 1..=ny {
            for x in 1..=nx {
              order.push(((offset + 1) as u32, PieceId::new(x, y), defects));
            }
          }
        }
      }
    }
    order
  }

  /// 有缺陷的切割块所在的位置，按表面顺序，表面内按分析结果中的顺序
  pub fn defective_placements(&self, surfaces: &[SurfaceDefects]) -> Vec<DefectivePlacement> {
    let mut placements = Vec::new();
    for (offset, defects) in surfaces.iter().enumerate() {
      let surface_index = (offset + 1) as u32;
      for text in &defects.pieces_with_defects {
        // 只接受规范写法，与 has_defect 的精确匹配保持一致
        let placement = text
          .parse::<PieceId>()
          .ok()
          .filter(|piece| piece.to_string() == *text)
          .and_then(|piece| Some((piece, self.placement(surface_index, piece)?)));
        match placement {
          Some((piece, placement)) => placements.push(DefectivePlacement {
            stack: placement.stack,
            position: placement.position,
            surface_index,
            piece,
          }),
          None => warn!("表面 {} 的切割块编号 {} 无效，忽略", defects.name, text),
        }
      }
    }
    placements
  }

  pub fn summary(&self, surface: SurfaceSize, surfaces: &[SurfaceDefects]) -> StackingSummary {
    let layout = self.allocate(surfaces);
    let (piece_width, piece_height) =
      match PieceGrid::new(surface, self.pieces_in_x, self.pieces_in_y) {
        Ok(grid) => (grid.piece_width(), grid.piece_height()),
        Err(_) => (0.0, 0.0),
      };
    StackingSummary {
      pieces_in_x: self.pieces_in_x,
      pieces_in_y: self.pieces_in_y,
      surface,
      piece_width,
      piece_height,
      strategy: self.strategy,
      capacity: self.capacity,
      total_surfaces: surfaces.len(),
      total_pieces: layout.total_pieces(),
      stack_count: layout.stacks.len(),
      full_stacks: layout.full_stacks(),
      defective: self.defective_placements(surfaces),
    }
  }
}

/// `stack_layout.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackLayout {
  pub strategy: StackingStrategy,
  pub capacity: usize,
  pub pieces_in_x: u32,
  pub pieces_in_y: u32,
  pub surfaces: usize,
  pub stacks: Vec<Stack>,
}

impl Record for StackLayout {
  const FILE_NAME: &'static str = "stack_layout.json";
}

impl StackLayout {
  pub fn total_pieces(&self) -> usize {
    self.stacks.iter().map(Stack::len).sum()
  }

  pub fn full_stacks(&self) -> usize {
    self.stacks.iter().filter(|stack| stack.is_full()).count()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefectivePlacement {
  pub stack: usize,
  pub position: usize,
  pub surface_index: u32,
  pub piece: PieceId,
}

impl fmt::Display for DefectivePlacement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Stack {} z{} (s{}{})",
      self.stack, self.position, self.surface_index, self.piece
    )
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackingSummary {
  pub pieces_in_x: u32,
  pub pieces_in_y: u32,
  pub surface: SurfaceSize,
  pub piece_width: f64,
  pub piece_height: f64,
  pub strategy: StackingStrategy,
  pub capacity: usize,
  pub total_surfaces: usize,
  pub total_pieces: usize,
  pub stack_count: usize,
  pub full_stacks: usize,
  pub defective: Vec<DefectivePlacement>,
}

impl fmt::Display for StackingSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Cutting Configuration:")?;
    writeln!(f)?;
    writeln!(
      f,
      "• Pieces per surface: {} × {}",
      self.pieces_in_x, self.pieces_in_y
    )?;
    writeln!(
      f,
      "• Surface size: {:.1} × {:.1} mm",
      self.surface.width, self.surface.height
    )?;
    writeln!(
      f,
      "• Cut piece size: {:.1} × {:.1} mm",
      self.piece_width, self.piece_height
    )?;
    writeln!(f, "• Stacking method: {}", self.strategy.label())?;
    writeln!(f, "• Total surfaces: {}", self.total_surfaces)?;
    writeln!(f, "• Total pieces: {}", self.total_pieces)?;
    writeln!(f, "• Number of stacks: {}", self.stack_count)?;
    writeln!(
      f,
      "• Full stacks ({} pieces): {}",
      self.capacity, self.full_stacks
    )?;
    writeln!(f)?;
    writeln!(f, "Defective Pieces by Stack:")?;
    if self.defective.is_empty() {
      write!(f, "No defective pieces found.")
    } else {
      let lines: Vec<String> = self.defective.iter().map(ToString::to_string).collect();
      write!(f, "{}", lines.join("\n"))
    }
  }
}
