// 该文件是 Plyscan （板检） 项目的一部分。
// src/detection.rs - 单张图像的检测结果
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
use serde_json::Value;
use tracing::{debug, warn};

use crate::{RecordError, lenient};

/// 检测程序输出的一个框，坐标相对于相机原始画面（像素）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Detection {
  #[serde(deserialize_with = "lenient::or_default")]
  pub class_name: String,
  /// 可能是 [0, 1]，也可能已经是百分数
  #[serde(deserialize_with = "lenient::or_default")]
  pub confidence: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub center_x: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub center_y: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub width: f64,
  #[serde(deserialize_with = "lenient::or_default")]
  pub height: f64,
}

impl Detection {
  pub fn center(&self) -> (f64, f64) {
    (self.center_x, self.center_y)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileDetections {
  #[serde(deserialize_with = "lenient::seq")]
  pub detections: Vec<Detection>,
}

impl TileDetections {
  /// 解析失败不是错误，检测文件可能还没写完
  pub fn parse(text: &str) -> Self {
    match serde_json::from_str::<Value>(text) {
      Ok(value) if value.is_object() => Self::deserialize(value).unwrap_or_default(),
      Ok(_) => {
        warn!("检测结果不是 JSON 对象，按无检测处理");
        Self::default()
      }
      Err(e) => {
        warn!("检测结果解析失败，按无检测处理: {}", e);
        Self::default()
      }
    }
  }

  /// 文件不存在时返回 `None`
  pub fn read(path: &Path) -> Result<Option<Self>, RecordError> {
    if !path.exists() {
      debug!("没有检测结果文件: {}", path.display());
      return Ok(None);
    }

    let text = std::fs::read_to_string(path).map_err(|source| RecordError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Some(Self::parse(&text)))
  }

  pub fn len(&self) -> usize {
    self.detections.len()
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

/// 拍摄图像的文件名，编号补足两位
pub fn tile_image_name(number: u32) -> String {
  format!("image_{:02}.jpg", number)
}

pub fn tile_detections_name(number: u32) -> String {
  format!("image_{:02}_detections.json", number)
}

/// 展示用的置信度：大于 1 视为百分数
pub fn display_confidence(confidence: f64) -> f64 {
  if confidence > 1.0 {
    confidence / 100.0
  } else {
    confidence
  }
}

pub fn format_confidence(confidence: f64) -> String {
  format!("{:.1}%", display_confidence(confidence) * 100.0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detector_output_keeps_the_fields_we_use() {
    let text = r#"{
      "detections": [{
        "xyxy": [910, 500, 1010, 580],
        "confidence": 87.5,
        "class_id": 0,
        "class_name": "damage",
        "width": 100,
        "height": 80,
        "area": 8000,
        "center_x": 960,
        "center_y": 540
      }]
    }"#;
    let tile = TileDetections::parse(text);
    assert_eq!(
      tile.detections,
      vec![Detection {
        class_name: "damage".to_string(),
        confidence: 87.5,
        center_x: 960.0,
        center_y: 540.0,
        width: 100.0,
        height: 80.0,
      }]
    );
  }

  #[test]
  fn partial_output_degrades_to_zero() {
    let tile = TileDetections::parse(r#"{"detections": [{"class_name": "oil"}, 5]}"#);
    assert_eq!(tile.len(), 2);
    assert_eq!(tile.detections[0].class_name, "oil");
    assert_eq!(tile.detections[0].center(), (0.0, 0.0));
    assert_eq!(tile.detections[1], Detection::default());
  }

  #[test]
  fn unreadable_output_means_no_detections() {
    assert!(TileDetections::parse("{\"detections\": [").is_empty());
    assert!(TileDetections::parse("[]").is_empty());
    assert!(TileDetections::parse("{}").is_empty());
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join(tile_detections_name(1));
    assert_eq!(TileDetections::read(&missing).unwrap(), None);
  }

  #[test]
  fn tile_names_are_zero_padded() {
    assert_eq!(tile_image_name(3), "image_03.jpg");
    assert_eq!(tile_detections_name(12), "image_12_detections.json");
  }

  #[test]
  fn confidence_is_normalised_only_for_display() {
    assert_eq!(display_confidence(0.875), 0.875);
    assert_eq!(display_confidence(87.5), 0.875);
    assert_eq!(display_confidence(1.0), 1.0);
    assert_eq!(format_confidence(87.5), "87.5%");
    assert_eq!(format_confidence(0.5), "50.0%");
  }
}
