// 该文件是 Plyscan （板检） 项目的一部分。
// src/stitch/label.rs - 在拼接图上标注缺陷
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

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::reproject::PhysicalDefect;

/// 缺陷类别对应的边框颜色
pub fn class_color(kind: &str) -> Rgb<u8> {
  match kind {
    "damage" => Rgb([255, 0, 0]),
    "mark" => Rgb([0, 255, 0]),
    "oil" => Rgb([0, 0, 255]),
    "edge" => Rgb([255, 165, 0]),
    _ => Rgb([128, 128, 128]),
  }
}

/// 按画布坐标画出缺陷框
#[derive(Debug, Clone, Copy, Default)]
pub struct Labeler;

impl Labeler {
  pub fn new() -> Self {
    Self
  }

  pub fn draw_defects(&self, image: &mut RgbImage, defects: &[PhysicalDefect]) {
    for defect in defects {
      let rect = &defect.canvas_position;
      let color = class_color(&defect.kind);

      let x = rect.left().max(0.0) as i32;
      let y = rect.top().max(0.0) as i32;
      let width = (rect.right().min(image.width() as f64) - x as f64).max(0.0) as u32;
      let height = (rect.bottom().min(image.height() as f64) - y as f64).max(0.0) as u32;
      if width == 0 || height == 0 {
        continue;
      }

      draw_hollow_rect_mut(image, Rect::at(x, y).of_size(width, height), color);
      // 第二道边框，线宽 2 像素
      if width > 2 && height > 2 {
        let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
        draw_hollow_rect_mut(image, inner, color);
      }
    }
  }

  /// 返回标注后的副本
  pub fn label(&self, image: &RgbImage, defects: &[PhysicalDefect]) -> RgbImage {
    let mut labeled = image.clone();
    self.draw_defects(&mut labeled, defects);
    labeled
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grid::CenteredRect;

  fn defect(kind: &str, rect: CenteredRect) -> PhysicalDefect {
    PhysicalDefect {
      kind: kind.to_string(),
      canvas_position: rect,
      ..PhysicalDefect::default()
    }
  }

  #[test]
  fn colours_per_class() {
    assert_eq!(class_color("damage"), Rgb([255, 0, 0]));
    assert_eq!(class_color("edge"), Rgb([255, 165, 0]));
    assert_eq!(class_color("scratch"), Rgb([128, 128, 128]));
  }

  #[test]
  fn outline_is_two_pixels_wide() {
    let image = RgbImage::new(40, 40);
    let boxed = defect("oil", CenteredRect::new(20.0, 20.0, 20.0, 20.0));
    let labeled = Labeler::new().label(&image, &[boxed]);
    let blue = Rgb([0, 0, 255]);
    assert_eq!(*labeled.get_pixel(10, 20), blue);
    assert_eq!(*labeled.get_pixel(11, 20), blue);
    assert_eq!(*labeled.get_pixel(12, 20), Rgb([0, 0, 0]));
    assert_eq!(*labeled.get_pixel(20, 20), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(10, 20), Rgb([0, 0, 0]));
  }

  #[test]
  fn boxes_outside_the_canvas_are_skipped() {
    let mut image = RgbImage::new(10, 10);
    let far = defect("mark", CenteredRect::new(-50.0, -50.0, 10.0, 10.0));
    Labeler::new().draw_defects(&mut image, &[far]);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }
}
