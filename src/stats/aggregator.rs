// 该文件是 Fenlei （分类） 项目的一部分。
// src/stats/aggregator.rs - 检测统计汇总
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

use std::{
  collections::BTreeMap,
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info};

use crate::{
  catalog::ClassCatalog,
  config::AppConfig,
  model::DetectionSet,
  stats::{ExportError, JsonLogStore, PersistenceError, StatRecord, record::DATE_FORMAT},
};

pub const CSV_HEADER: &str = "记录ID,日期,时间,检测数量,类别详情,垃圾分类,检测耗时(ms)";
const CSV_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `record` 的结果：写入内存的记录以及持久化是否成功
#[derive(Debug)]
pub struct Recorded {
  pub record: StatRecord,
  pub persistence: Result<(), PersistenceError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodaySummary {
  pub date: String,
  pub detection_count: usize,
  pub total_items: usize,
  pub category_breakdown: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalSummary {
  pub total_detections: usize,
  pub total_items: usize,
  pub category_totals: BTreeMap<String, usize>,
  pub class_totals: BTreeMap<String, usize>,
}

/// 提供给界面的统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
  pub today: TodaySummary,
  pub category_totals: BTreeMap<String, usize>,
  pub total_detections: usize,
}

/// 检测统计：内存中的记录日志为准，每次变更后整体写回文件
pub struct StatisticsAggregator {
  store: JsonLogStore,
  catalog: Arc<ClassCatalog>,
  records: Vec<StatRecord>,
  export_dir: PathBuf,
}

impl StatisticsAggregator {
  /// 载入已有日志；文件缺失或损坏时从空日志开始
  pub fn open(path: impl Into<PathBuf>, catalog: Arc<ClassCatalog>) -> Self {
    let store = JsonLogStore::new(path);
    let export_dir = store
      .path()
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();
    let records = store.load();
    info!("统计记录已载入: {} 条", records.len());

    StatisticsAggregator {
      store,
      catalog,
      records,
      export_dir,
    }
  }

  pub fn from_config(config: &AppConfig, catalog: Arc<ClassCatalog>) -> Self {
    Self::open(config.statistics_path(), catalog).with_export_dir(&config.save_dir)
  }

  /// CSV 默认导出目录
  pub fn with_export_dir(mut self, directory: impl Into<PathBuf>) -> Self {
    self.export_dir = directory.into();
    self
  }

  pub fn path(&self) -> &Path {
    self.store.path()
  }

  pub fn records(&self) -> &[StatRecord] {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  fn next_id(&self) -> u64 {
    self.records.iter().map(|r| r.id).max().unwrap_or(0) + 1
  }

  fn fallback(&self) -> &str {
    self.catalog.fallback_category()
  }

  pub fn record(&mut self, detections: &DetectionSet) -> Option<Recorded> {
    self.record_at(detections, Local::now())
  }

  /// 空检测结果不产生记录，也不占用编号
  pub fn record_at(&mut self, detections: &DetectionSet, now: DateTime<Local>) -> Option<Recorded> {
    if detections.is_empty() {
      return None;
    }

    let record = StatRecord::from_detections(self.next_id(), detections, &self.catalog, now);
    self.records.push(record.clone());

    let persistence = self.store.save(&self.records);
    if let Err(e) = &persistence {
      error!("保存统计记录失败: {}", e);
    }
    info!("新增统计记录 #{}: {} 个目标", record.id, record.item_count());

    Some(Recorded {
      record,
      persistence,
    })
  }

  pub fn today_summary(&self) -> TodaySummary {
    self.summary_for(Local::now().date_naive())
  }

  pub fn summary_for(&self, date: NaiveDate) -> TodaySummary {
    let date = date.format(DATE_FORMAT).to_string();
    let mut detection_count = 0;
    let mut total_items = 0;
    let mut category_breakdown = BTreeMap::new();

    for record in self.records.iter().filter(|r| r.date == date) {
      detection_count += 1;
      for item in &record.items {
        total_items += 1;
        *category_breakdown
          .entry(item.category_or(self.fallback()).to_string())
          .or_default() += 1;
      }
    }

    TodaySummary {
      date,
      detection_count,
      total_items,
      category_breakdown,
    }
  }

  pub fn category_totals(&self) -> BTreeMap<String, usize> {
    let mut totals = BTreeMap::new();
    for item in self.records.iter().flat_map(|r| &r.items) {
      *totals
        .entry(item.category_or(self.fallback()).to_string())
        .or_default() += 1;
    }
    totals
  }

  /// 按显示名称统计，名称缺失时使用目录中的名称
  pub fn class_totals(&self) -> BTreeMap<String, usize> {
    let mut totals = BTreeMap::new();
    for item in self.records.iter().flat_map(|r| &r.items) {
      let name = if item.name.is_empty() {
        self.catalog.resolve(item.class_id).display_name
      } else {
        item.name.clone()
      };
      *totals.entry(name).or_default() += 1;
    }
    totals
  }

  /// 每日检测到的目标数
  pub fn daily_totals(&self) -> BTreeMap<String, usize> {
    let mut totals = BTreeMap::new();
    for record in &self.records {
      *totals.entry(record.date.clone()).or_default() += record.item_count();
    }
    totals
  }

  pub fn total_summary(&self) -> TotalSummary {
    TotalSummary {
      total_detections: self.records.len(),
      total_items: self.records.iter().map(StatRecord::item_count).sum(),
      category_totals: self.category_totals(),
      class_totals: self.class_totals(),
    }
  }

  /// 最近的记录，新的在前
  pub fn recent_records(&self, limit: usize) -> Vec<&StatRecord> {
    self.records.iter().rev().take(limit).collect()
  }

  pub fn snapshot(&self) -> StatisticsSnapshot {
    StatisticsSnapshot {
      today: self.today_summary(),
      category_totals: self.category_totals(),
      total_detections: self.records.len(),
    }
  }

  /// 清空全部记录，不可恢复
  pub fn clear(&mut self) -> Result<(), PersistenceError> {
    self.records.clear();
    info!("统计记录已清空");
    self.store.save(&self.records).inspect_err(|e| {
      error!("保存统计记录失败: {}", e);
    })
  }

  pub fn default_export_path(&self, now: DateTime<Local>) -> PathBuf {
    self.export_dir.join(format!(
      "statistics_export_{}.csv",
      now.format("%Y%m%d_%H%M%S")
    ))
  }

  /// 导出为带 BOM 的 UTF-8 CSV，返回实际写入的路径
  pub fn export_csv(&self, path: Option<&Path>) -> Result<PathBuf, ExportError> {
    let path = path
      .map(Path::to_path_buf)
      .unwrap_or_else(|| self.default_export_path(Local::now()));

    let export_failed = |source| ExportError::ExportFailed {
      path: path.clone(),
      source,
    };

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(export_failed)?;
    }
    let file = File::create(&path).map_err(export_failed)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(CSV_BOM).map_err(export_failed)?;
    self.write_csv(&mut writer).map_err(export_failed)?;
    writer.flush().map_err(export_failed)?;

    info!("导出 {} 条统计记录到 {}", self.records.len(), path.display());
    Ok(path)
  }

  /// 按记录顺序逐行写出，不含 BOM
  pub fn write_csv<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "{}", CSV_HEADER)?;
    for record in &self.records {
      writeln!(
        writer,
        "{},{},{},{},{},{},{:.1}",
        record.id,
        csv_field(&record.date),
        csv_field(&record.time),
        record.item_count(),
        csv_field(&record.joined_names()),
        csv_field(&record.joined_categories(self.fallback())),
        record.elapsed_ms
      )?;
    }
    Ok(())
  }
}

fn csv_field(value: &str) -> String {
  if value.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}
