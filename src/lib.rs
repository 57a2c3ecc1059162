// 该文件是 Plyscan （板检） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod analysis;
pub mod detection;
pub mod grid;
pub mod lenient;
pub mod record;
pub mod reproject;
pub mod session;
pub mod stacking;
#[cfg(feature = "stitch_image")]
pub mod stitch;
pub mod surface;

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

pub use record::RecordError;

/// 落盘的 JSON 文档，上一阶段的输出即下一阶段的输入
pub trait Record: Serialize + DeserializeOwned {
  /// 文档在目录中的文件名
  const FILE_NAME: &'static str;

  fn load(path: &Path) -> Result<Self, RecordError> {
    record::read_json(path)
  }

  fn save(&self, path: &Path) -> Result<(), RecordError> {
    record::write_json(path, self)
  }

  fn load_from_dir(dir: &Path) -> Result<Self, RecordError> {
    Self::load(&dir.join(Self::FILE_NAME))
  }

  /// 覆盖写入目录中的同名文件，返回写入路径
  fn save_to_dir(&self, dir: &Path) -> Result<PathBuf, RecordError> {
    let path = dir.join(Self::FILE_NAME);
    self.save(&path)?;
    Ok(path)
  }
}
