// 该文件是 Fenlei （分类） 项目的一部分。
// src/stats/record.rs - 统计记录
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

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{catalog::ClassCatalog, model::DetectionSet};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordItem {
  pub class_id: u32,
  /// 显示名称
  #[serde(default)]
  pub name: String,
  /// 手工编辑过的日志可能缺少分类，统计时归入目录的兜底分类
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default)]
  pub confidence: f32,
}

impl RecordItem {
  pub fn category_or<'a>(&'a self, fallback: &'a str) -> &'a str {
    self.category.as_deref().unwrap_or(fallback)
  }
}

/// 一条持久化的检测记录，写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
  pub id: u64,
  /// RFC 3339 本地时间
  pub timestamp: String,
  pub date: String,
  pub time: String,
  #[serde(default)]
  pub total_count: usize,
  #[serde(default)]
  pub items: Vec<RecordItem>,
  #[serde(default)]
  pub elapsed_ms: f64,
}

impl StatRecord {
  pub fn from_detections(
    id: u64,
    detections: &DetectionSet,
    catalog: &ClassCatalog,
    now: DateTime<Local>,
  ) -> Self {
    let items: Vec<RecordItem> = detections
      .iter()
      .map(|detection| {
        let label = catalog.resolve(detection.class_id());
        RecordItem {
          class_id: label.class_id,
          name: label.display_name,
          category: Some(label.category),
          confidence: detection.confidence(),
        }
      })
      .collect();

    StatRecord {
      id,
      timestamp: now.to_rfc3339(),
      date: now.format(DATE_FORMAT).to_string(),
      time: now.format(TIME_FORMAT).to_string(),
      total_count: items.len(),
      items,
      elapsed_ms: detections.elapsed_ms(),
    }
  }

  pub fn item_count(&self) -> usize {
    self.items.len()
  }

  /// `;` 连接的名称，供 CSV 导出
  pub fn joined_names(&self) -> String {
    self
      .items
      .iter()
      .map(|item| item.name.as_str())
      .collect::<Vec<_>>()
      .join(";")
  }

  pub fn joined_categories(&self, fallback: &str) -> String {
    self
      .items
      .iter()
      .map(|item| item.category_or(fallback))
      .collect::<Vec<_>>()
      .join(";")
  }
}
