// 该文件是 Plyscan （板检） 项目的一部分。
// src/stitch.rs - 拍摄图像拼接
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

#[cfg(feature = "label_image")]
mod label;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::{
  DynamicImage, ImageReader, RgbImage,
  codecs::jpeg::JpegEncoder,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  detection::tile_image_name,
  grid::{CanvasLayout, CaptureGrid, CropWindow},
  reproject::Reprojector,
};

#[cfg(feature = "label_image")]
pub use label::{Labeler, class_color};

pub const STITCHED_FILE: &str = "stitched.jpg";
pub const LABELED_FILE: &str = "stitched_labeled.jpg";

const JPEG_QUALITY: u8 = 100;

#[derive(Error, Debug)]
pub enum StitchError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 从图像中心裁剪出取景框；图像比取景框小时按比例缩放到取景框内
pub fn crop_center(image: &RgbImage, crop: &CropWindow) -> RgbImage {
  let (cw, ch) = (crop.crop_width, crop.crop_height);
  if image.width() < cw || image.height() < ch {
    return DynamicImage::ImageRgb8(image.clone())
      .resize(cw, ch, FilterType::Triangle)
      .into_rgb8();
  }

  let x = (image.width() - cw) / 2;
  let y = (image.height() - ch) / 2;
  imageops::crop_imm(image, x, y, cw, ch).to_image()
}

/// 把每张拍摄图像的取景框按拍摄位置贴到画布上
#[derive(Debug, Clone)]
pub struct Stitcher {
  grid: CaptureGrid,
  layout: CanvasLayout,
  crop: CropWindow,
}

impl Stitcher {
  pub fn new(grid: CaptureGrid, layout: CanvasLayout, crop: CropWindow) -> Self {
    Self { grid, layout, crop }
  }

  pub fn from_reprojector(reprojector: &Reprojector) -> Self {
    Self::new(
      reprojector.grid().clone(),
      *reprojector.layout(),
      *reprojector.crop(),
    )
  }

  /// `tiles[i]` 是第 `i` 个拍摄位置的图像，缺失的位置保持黑色
  pub fn compose(&self, tiles: &[Option<RgbImage>]) -> RgbImage {
    let mut canvas = RgbImage::new(self.layout.width(), self.layout.height());
    for (position, tile) in tiles.iter().enumerate().take(self.grid.len()) {
      let Some(tile) = tile else {
        continue;
      };
      let (x, y) = self.layout.origin_for_position(position);
      let cropped = crop_center(tile, &self.crop);
      imageops::replace(&mut canvas, &cropped, x as i64, y as i64);
    }
    canvas
  }

  /// 读取表面目录下的 `image_NN.jpg` 并拼接
  pub fn stitch(&self, dir: &Path) -> Result<RgbImage, StitchError> {
    let mut tiles = Vec::with_capacity(self.grid.len());
    for (_, number, _) in self.grid.tiles() {
      let path = dir.join(tile_image_name(number));
      if !path.exists() {
        debug!("缺少图像 {}", path.display());
        tiles.push(None);
        continue;
      }
      match read_tile(&path) {
        Ok(tile) => tiles.push(Some(tile)),
        Err(e) => {
          warn!("无法读取图像 {}，按缺失处理: {}", path.display(), e);
          tiles.push(None);
        }
      }
    }

    let loaded = tiles.iter().filter(|tile| tile.is_some()).count();
    info!(
      "拼接 {} 张图像到 {}x{} 画布",
      loaded,
      self.layout.width(),
      self.layout.height()
    );
    Ok(self.compose(&tiles))
  }
}

fn read_tile(path: &Path) -> Result<RgbImage, StitchError> {
  Ok(ImageReader::open(path)?.decode()?.into_rgb8())
}

/// 以最高质量保存 JPEG
pub fn save_jpeg(image: &RgbImage, path: &Path) -> Result<(), StitchError> {
  let writer = BufWriter::new(File::create(path)?);
  let mut encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
  encoder.encode_image(image)?;
  debug!("保存图像 {}", path.display());
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn large_tiles_are_cropped_around_the_centre() {
    let mut tile = RgbImage::new(20, 10);
    tile.put_pixel(6, 3, Rgb([255, 0, 0]));
    let crop = CropWindow {
      frame_width: 20,
      frame_height: 10,
      crop_width: 8,
      crop_height: 4,
    };
    let cropped = crop_center(&tile, &crop);
    assert_eq!(cropped.dimensions(), (8, 4));
    assert_eq!(*cropped.get_pixel(0, 0), Rgb([255, 0, 0]));
  }

  #[test]
  fn small_tiles_are_scaled_to_fit() {
    let tile = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
    let cropped = crop_center(&tile, &CropWindow::default());
    assert_eq!(cropped.height(), CropWindow::default().crop_height);
    assert!(cropped.width() <= CropWindow::default().crop_width);
  }

  #[test]
  fn missing_tiles_leave_black_cells() {
    let crop = CropWindow {
      frame_width: 4,
      frame_height: 4,
      crop_width: 2,
      crop_height: 2,
    };
    let grid = CaptureGrid::row_major(2, 1).unwrap();
    let layout = CanvasLayout::new(4, 2, 2, 1);
    let stitcher = Stitcher::new(grid, layout, crop);

    let white = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
    let canvas = stitcher.compose(&[None, Some(white)]);
    assert_eq!(canvas.dimensions(), (4, 2));
    assert_eq!(*canvas.get_pixel(0, 0), Rgb([0, 0, 0]));
    assert_eq!(*canvas.get_pixel(1, 1), Rgb([0, 0, 0]));
    assert_eq!(*canvas.get_pixel(2, 0), Rgb([255, 255, 255]));
    assert_eq!(*canvas.get_pixel(3, 1), Rgb([255, 255, 255]));
  }

  #[test]
  fn unreadable_tiles_are_treated_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let crop = CropWindow {
      frame_width: 4,
      frame_height: 4,
      crop_width: 2,
      crop_height: 2,
    };
    let grid = CaptureGrid::row_major(2, 1).unwrap();
    let layout = CanvasLayout::new(4, 2, 2, 1);
    let stitcher = Stitcher::new(grid, layout, crop);

    std::fs::write(dir.path().join(tile_image_name(1)), "not an image").unwrap();
    RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]))
      .save(dir.path().join(tile_image_name(2)))
      .unwrap();

    let canvas = stitcher.stitch(dir.path()).unwrap();
    assert_eq!(canvas.dimensions(), (4, 2));
    assert_eq!(*canvas.get_pixel(0, 0), Rgb([0, 0, 0]));
    assert!(canvas.get_pixel(3, 1).0.iter().all(|&c| c > 200));
  }

  #[test]
  fn stitched_canvas_is_written_as_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(STITCHED_FILE);
    save_jpeg(&RgbImage::new(16, 8), &path).unwrap();
    let decoded = ImageReader::open(&path).unwrap().decode().unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 8));
  }
}
