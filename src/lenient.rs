// 该文件是 Plyscan （板检） 项目的一部分。
// src/lenient.rs - 宽松的字段解码
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

//! 检测程序可能写出不完整的文件，字段缺失或类型不符时一律退化为零值/空值。
//!
//! 配合容器上的 `#[serde(default)]` 使用：缺失字段取默认值，
//! 存在但无法解码的字段经由这里的 `deserialize_with` 函数取默认值。

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// 任意字段：无法解码时取 `T::default()`
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned + Default,
{
  let value = Value::deserialize(deserializer)?;
  Ok(T::deserialize(value).unwrap_or_default())
}

/// 非负整数字段：接受整数或浮点数（截断），其余取 0
pub fn integer<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: TryFrom<u64> + Default,
{
  let value = Value::deserialize(deserializer)?;
  let number = value.as_u64().or_else(|| {
    value
      .as_f64()
      .filter(|f| f.is_finite() && *f >= 0.0)
      .map(|f| f as u64)
  });
  Ok(number.and_then(|n| T::try_from(n).ok()).unwrap_or_default())
}

/// 列表字段：非数组取空列表，无法解码的元素取 `T::default()`
pub fn seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned + Default,
{
  match Value::deserialize(deserializer)? {
    Value::Array(items) => Ok(
      items
        .into_iter()
        .map(|item| T::deserialize(item).unwrap_or_default())
        .collect(),
    ),
    _ => Ok(Vec::new()),
  }
}

#[cfg(test)]
mod tests {
  use serde::Deserialize;

  #[derive(Debug, Default, PartialEq, Deserialize)]
  #[serde(default)]
  struct Sample {
    #[serde(deserialize_with = "super::or_default")]
    label: String,
    #[serde(deserialize_with = "super::or_default")]
    score: f64,
    #[serde(deserialize_with = "super::integer")]
    count: u32,
    #[serde(deserialize_with = "super::seq")]
    items: Vec<u32>,
  }

  #[test]
  fn missing_fields_take_defaults() {
    let sample: Sample = serde_json::from_str("{}").unwrap();
    assert_eq!(sample, Sample::default());
  }

  #[test]
  fn wrong_types_take_defaults() {
    let sample: Sample =
      serde_json::from_str(r#"{"label": 7, "score": "high", "count": "3", "items": {}}"#).unwrap();
    assert_eq!(sample, Sample::default());
  }

  #[test]
  fn integers_accept_floats() {
    let sample: Sample = serde_json::from_str(r#"{"count": 3.0, "score": 2}"#).unwrap();
    assert_eq!(sample.count, 3);
    assert_eq!(sample.score, 2.0);
  }

  #[test]
  fn bad_list_elements_become_defaults() {
    let sample: Sample = serde_json::from_str(r#"{"items": [1, "x", 3]}"#).unwrap();
    assert_eq!(sample.items, vec![1, 0, 3]);
  }
}
