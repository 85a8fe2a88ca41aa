// 该文件是 Fenlei （分类） 项目的一部分。
// src/config.rs - 应用配置
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

//! # 应用配置
//!
//! 配置在启动时构造一次，随后以不可变值的形式显式传递给检测流水线与统计模块。
//!
//! ```toml
//! save_dir = "save_data"
//! catalog = "kitchen"
//! sample_interval = 30
//! default_fps = 30.0
//! delivery = "latest"
//! record_video = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
  catalog::{BuiltinCatalog, CatalogError, ClassCatalog},
  pipeline::Delivery,
};

pub const DEFAULT_SAMPLE_INTERVAL: u32 = 30;
pub const DEFAULT_FPS: f64 = 30.0;
/// 可用于节拍控制的帧率范围
pub const MIN_FPS: f64 = 0.1;
pub const MAX_FPS: f64 = 1000.0;
const STATISTICS_FILE_NAME: &str = "statistics.json";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("配置项无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// 检测结果、录像与统计数据的保存目录
  pub save_dir: PathBuf,
  /// 统计记录文件，缺省为 `<save_dir>/statistics.json`
  pub statistics_file: Option<PathBuf>,
  /// 内置类别表名称（`kitchen` 或 `basic`）
  pub catalog: String,
  /// 自定义类别表文件，优先于 `catalog`
  pub catalog_file: Option<PathBuf>,
  /// 连续输入时每隔多少帧记录一次统计
  pub sample_interval: u32,
  /// 输入源未提供帧率时采用的帧率
  pub default_fps: f64,
  pub delivery: Delivery,
  pub record_video: bool,
  /// 标注文字所用字体，缺省时只绘制检测框
  pub font: Option<PathBuf>,
}

impl Default for AppConfig {
  fn default() -> Self {
    AppConfig {
      save_dir: PathBuf::from("save_data"),
      statistics_file: None,
      catalog: "kitchen".to_string(),
      catalog_file: None,
      sample_interval: DEFAULT_SAMPLE_INTERVAL,
      default_fps: DEFAULT_FPS,
      delivery: Delivery::default(),
      record_video: false,
      font: None,
    }
  }
}

impl AppConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    info!("加载配置文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.sample_interval == 0 {
      return Err(ConfigError::Invalid("sample_interval 必须大于 0".to_string()));
    }
    if !is_usable_fps(self.default_fps) {
      return Err(ConfigError::Invalid(format!(
        "default_fps 必须在 {} 到 {} 之间，实际为 {}",
        MIN_FPS, MAX_FPS, self.default_fps
      )));
    }
    Ok(())
  }

  pub fn statistics_path(&self) -> PathBuf {
    self
      .statistics_file
      .clone()
      .unwrap_or_else(|| self.save_dir.join(STATISTICS_FILE_NAME))
  }

  pub fn load_catalog(&self) -> Result<ClassCatalog, CatalogError> {
    match &self.catalog_file {
      Some(path) => ClassCatalog::load(path),
      None => ClassCatalog::builtin(self.catalog.parse::<BuiltinCatalog>()?),
    }
  }
}

pub fn is_usable_fps(fps: f64) -> bool {
  (MIN_FPS..=MAX_FPS).contains(&fps)
}
