// 该文件是 Plyscan （板检） 项目的一部分。
// src/record.rs - JSON 文档读写
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("无法读取文件 {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法写入文件 {path}: {source}")]
  Write {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("JSON 格式错误 {path}: {source}")]
  Json {
    path: PathBuf,
    source: serde_json::Error,
  },
  #[error("文件 {0} 的内容不是 JSON 对象")]
  NotAnObject(PathBuf),
}

impl RecordError {
  pub fn path(&self) -> &Path {
    match self {
      RecordError::Read { path, .. }
      | RecordError::Write { path, .. }
      | RecordError::Json { path, .. }
      | RecordError::NotAnObject(path) => path,
    }
  }
}

/// 读取 JSON 文档，顶层必须是对象；字段层面的缺失与类型错误交给 [`crate::lenient`]
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RecordError> {
  let text = std::fs::read_to_string(path).map_err(|source| RecordError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  let value: Value = serde_json::from_str(&text).map_err(|source| RecordError::Json {
    path: path.to_path_buf(),
    source,
  })?;

  if !value.is_object() {
    return Err(RecordError::NotAnObject(path.to_path_buf()));
  }

  T::deserialize(value).map_err(|source| RecordError::Json {
    path: path.to_path_buf(),
    source,
  })
}

/// 以缩进格式覆盖写入，不保证原子性
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RecordError> {
  let text = serde_json::to_string_pretty(value).map_err(|source| RecordError::Json {
    path: path.to_path_buf(),
    source,
  })?;

  std::fs::write(path, text.as_bytes()).map_err(|source| RecordError::Write {
    path: path.to_path_buf(),
    source,
  })?;

  debug!("写入 {} 字节到 {}", text.len(), path.display());
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
  #[serde(default)]
  struct Sample {
    name: String,
    value: f64,
  }

  #[test]
  fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = read_json::<Sample>(&path).unwrap_err();
    assert!(matches!(err, RecordError::Read { .. }));
    assert_eq!(err.path(), path.as_path());
  }

  #[test]
  fn top_level_array_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("array.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();
    assert!(matches!(
      read_json::<Sample>(&path),
      Err(RecordError::NotAnObject(_))
    ));
  }

  #[test]
  fn truncated_document_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.json");
    std::fs::write(&path, "{\"name\": \"a\", \"val").unwrap();
    assert!(matches!(
      read_json::<Sample>(&path),
      Err(RecordError::Json { .. })
    ));
  }

  #[test]
  fn write_then_read_returns_the_same_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.json");
    let sample = Sample {
      name: "panel".to_string(),
      value: 12.5,
    };
    write_json(&path, &sample).unwrap();
    assert_eq!(read_json::<Sample>(&path).unwrap(), sample);
  }
}
