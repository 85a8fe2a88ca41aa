// 该文件是 Fenlei （分类） 项目的一部分。
// src/catalog.rs - 类别表
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

//! # 类别表
//!
//! 类别表把模型输出的 `class_id` 映射为内部名称、中文显示名、垃圾分类和投放提示。
//! 类别表在进程启动时加载一次，之后只读，并以 `Arc<ClassCatalog>` 的形式注入
//! 检测流水线与统计模块。
//!
//! 内置两份标签文件：
//! - `labels/kitchen.toml` - 厨房垃圾 29 类
//! - `labels/basic.toml` - 基础 5 类
//!
//! 未知的 `class_id` 不会报错，而是降级为占位标签 `类别{id}`。

use std::{collections::BTreeMap, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const KITCHEN_LABELS: &str = include_str!("../labels/kitchen.toml");
const BASIC_LABELS: &str = include_str!("../labels/basic.toml");

pub const DEFAULT_FALLBACK_CATEGORY: &str = "其他垃圾";
const UNKNOWN_TIP: &str = "请查阅分类指南";
const UNKNOWN_COLOR: &str = "gray";

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("类别编号重复: {0}")]
  DuplicateId(u32),
  #[error("类别表为空")]
  Empty,
  #[error("未知的内置类别表: {0}")]
  UnknownBuiltin(String),
}

fn default_color() -> String {
  UNKNOWN_COLOR.to_string()
}

fn default_fallback_category() -> String {
  DEFAULT_FALLBACK_CATEGORY.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
  pub id: u32,
  pub name: String,
  pub display_name: String,
  pub category: String,
  #[serde(default = "default_color")]
  pub color: String,
  #[serde(default)]
  pub tip: String,
}

#[derive(Deserialize)]
struct CatalogFile {
  version: String,
  #[serde(default = "default_fallback_category")]
  fallback_category: String,
  classes: Vec<ClassInfo>,
}

/// 解析后的类别标签，未知类别时 `known` 为 `false`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabel {
  pub class_id: u32,
  pub name: String,
  pub display_name: String,
  pub category: String,
  pub color: String,
  pub tip: String,
  pub known: bool,
}

impl ClassLabel {
  /// 分类指导文本，例如 `【易拉罐】→ 可回收物: 请清洗后投入蓝色可回收垃圾桶`
  pub fn guidance(&self) -> String {
    format!("【{}】→ {}: {}", self.display_name, self.category, self.tip)
  }

  pub fn rgb(&self) -> [u8; 3] {
    color_rgb(&self.color)
  }
}

/// 颜色名到 RGB 的映射，未知颜色按灰色处理
pub fn color_rgb(name: &str) -> [u8; 3] {
  match name {
    "green" => [0x4C, 0xAF, 0x50],
    "blue" => [0x21, 0x96, 0xF3],
    "red" => [0xF4, 0x43, 0x36],
    _ => [0x9E, 0x9E, 0x9E],
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCatalog {
  Kitchen,
  Basic,
}

impl FromStr for BuiltinCatalog {
  type Err = CatalogError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "kitchen" => Ok(BuiltinCatalog::Kitchen),
      "basic" => Ok(BuiltinCatalog::Basic),
      other => Err(CatalogError::UnknownBuiltin(other.to_string())),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ClassCatalog {
  version: String,
  fallback_category: String,
  classes: BTreeMap<u32, ClassInfo>,
}

impl ClassCatalog {
  pub fn builtin(kind: BuiltinCatalog) -> Result<Self, CatalogError> {
    match kind {
      BuiltinCatalog::Kitchen => Self::from_toml_str(KITCHEN_LABELS),
      BuiltinCatalog::Basic => Self::from_toml_str(BASIC_LABELS),
    }
  }

  pub fn load(path: &Path) -> Result<Self, CatalogError> {
    info!("加载类别表: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
    let file: CatalogFile = toml::from_str(content)?;
    if file.classes.is_empty() {
      return Err(CatalogError::Empty);
    }

    let mut classes = BTreeMap::new();
    for class in file.classes {
      let id = class.id;
      if classes.insert(id, class).is_some() {
        return Err(CatalogError::DuplicateId(id));
      }
    }

    debug!("类别表 {} 共 {} 个类别", file.version, classes.len());
    Ok(ClassCatalog {
      version: file.version,
      fallback_category: file.fallback_category,
      classes,
    })
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn fallback_category(&self) -> &str {
    &self.fallback_category
  }

  pub fn len(&self) -> usize {
    self.classes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.classes.is_empty()
  }

  pub fn get(&self, class_id: u32) -> Option<&ClassInfo> {
    self.classes.get(&class_id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
    self.classes.values()
  }

  /// 按首次出现顺序列出全部分类（去重）
  pub fn categories(&self) -> Vec<&str> {
    let mut categories: Vec<&str> = Vec::new();
    for class in self.classes.values() {
      if !categories.contains(&class.category.as_str()) {
        categories.push(&class.category);
      }
    }
    if !categories.contains(&self.fallback_category.as_str()) {
      categories.push(&self.fallback_category);
    }
    categories
  }

  pub fn resolve(&self, class_id: u32) -> ClassLabel {
    match self.classes.get(&class_id) {
      Some(class) => ClassLabel {
        class_id,
        name: class.name.clone(),
        display_name: class.display_name.clone(),
        category: class.category.clone(),
        color: class.color.clone(),
        tip: class.tip.clone(),
        known: true,
      },
      None => {
        debug!("未知类别编号 {}，使用占位标签", class_id);
        ClassLabel {
          class_id,
          name: format!("class_{}", class_id),
          display_name: format!("类别{}", class_id),
          category: self.fallback_category.clone(),
          color: UNKNOWN_COLOR.to_string(),
          tip: UNKNOWN_TIP.to_string(),
          known: false,
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_catalogs_load() {
    let kitchen = ClassCatalog::builtin(BuiltinCatalog::Kitchen).unwrap();
    assert_eq!(kitchen.len(), 29);
    assert_eq!(kitchen.version(), "kitchen-29");
    assert_eq!(kitchen.get(19).unwrap().display_name, "易拉罐");
    assert_eq!(kitchen.get(18).unwrap().category, "其他垃圾");
    assert_eq!(kitchen.get(27).unwrap().category, "有害垃圾");

    let basic = ClassCatalog::builtin(BuiltinCatalog::Basic).unwrap();
    assert_eq!(basic.len(), 5);
    assert_eq!(basic.get(2).unwrap().name, "zip_top_can");
  }

  #[test]
  fn unknown_class_degrades_to_placeholder() {
    let catalog = ClassCatalog::builtin(BuiltinCatalog::Basic).unwrap();
    let label = catalog.resolve(42);
    assert!(!label.known);
    assert_eq!(label.display_name, "类别42");
    assert_eq!(label.category, "其他垃圾");
    assert_eq!(label.tip, "请查阅分类指南");
    assert_eq!(label.rgb(), color_rgb("gray"));
  }

  #[test]
  fn guidance_line() {
    let catalog = ClassCatalog::builtin(BuiltinCatalog::Basic).unwrap();
    assert_eq!(
      catalog.resolve(2).guidance(),
      "【易拉罐】→ 可回收物: 请清洗后投入蓝色可回收垃圾桶"
    );
  }

  #[test]
  fn rejects_duplicate_ids() {
    let content = r#"
version = "dup"

[[classes]]
id = 0
name = "a"
display_name = "甲"
category = "A"

[[classes]]
id = 0
name = "b"
display_name = "乙"
category = "B"
"#;
    assert!(matches!(
      ClassCatalog::from_toml_str(content),
      Err(CatalogError::DuplicateId(0))
    ));
  }

  #[test]
  fn categories_are_distinct_and_include_fallback() {
    let catalog = ClassCatalog::builtin(BuiltinCatalog::Kitchen).unwrap();
    assert_eq!(
      catalog.categories(),
      vec!["厨余垃圾", "可回收物", "其他垃圾", "有害垃圾"]
    );
  }

  #[test]
  fn parses_builtin_names() {
    assert_eq!("kitchen".parse::<BuiltinCatalog>().unwrap(), BuiltinCatalog::Kitchen);
    assert!("nope".parse::<BuiltinCatalog>().is_err());
  }
}
