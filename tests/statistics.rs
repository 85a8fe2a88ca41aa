// 该文件是 Fenlei （分类） 项目的一部分。
// tests/statistics.rs - 统计模块集成测试
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

use std::{fs, sync::Arc};

use anyhow::Result;

use fenlei::{
  catalog::ClassCatalog,
  frame::FrameSize,
  model::{BoundingBox, Detection, DetectionSet},
  stats::{CSV_HEADER, StatisticsAggregator},
};

const TWO_CATEGORIES: &str = r#"
version = "test-2"

[[classes]]
id = 0
name = "apple"
display_name = "苹果核"
category = "A"

[[classes]]
id = 1
name = "bottle"
display_name = "塑料瓶"
category = "B"
"#;

fn catalog() -> Result<Arc<ClassCatalog>> {
  Ok(Arc::new(ClassCatalog::from_toml_str(TWO_CATEGORIES)?))
}

fn detections(class_ids: &[u32]) -> DetectionSet {
  let items = class_ids
    .iter()
    .filter_map(|&id| BoundingBox::new(0, 0, 10, 10).map(|bbox| Detection::new(bbox, id, 0.8)))
    .collect();
  DetectionSet::new(items, 15.0, FrameSize::new(32, 32))
}

#[test]
fn one_record_with_two_categories() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let mut stats = StatisticsAggregator::open(dir.path().join("statistics.json"), catalog()?);

  let recorded = stats.record(&detections(&[0, 1])).expect("non-empty set is recorded");
  assert!(recorded.persistence.is_ok());

  let totals = stats.category_totals();
  assert_eq!(totals.len(), 2);
  assert_eq!(totals.get("A"), Some(&1));
  assert_eq!(totals.get("B"), Some(&1));

  let today = stats.today_summary();
  assert_eq!(today.detection_count, 1);
  assert_eq!(today.total_items, 2);
  Ok(())
}

#[test]
fn empty_sets_are_not_recorded() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let mut stats = StatisticsAggregator::open(dir.path().join("statistics.json"), catalog()?);

  for _ in 0..3 {
    assert!(stats.record(&detections(&[])).is_none());
  }
  let recorded = stats.record(&detections(&[1])).expect("recorded");

  assert_eq!(stats.len(), 1);
  assert_eq!(recorded.record.id, 1);
  Ok(())
}

#[test]
fn csv_export_has_header_and_one_row_per_record() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let mut stats = StatisticsAggregator::open(dir.path().join("statistics.json"), catalog()?);
  stats.record(&detections(&[0]));
  stats.record(&detections(&[0, 1]));

  let target = dir.path().join("export").join("out.csv");
  let written = stats.export_csv(Some(target.as_path()))?;
  assert_eq!(written, target);

  let bytes = fs::read(&written)?;
  assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
  let text = String::from_utf8(bytes[3..].to_vec())?;
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(lines.len(), 3);
  assert_eq!(lines[0], CSV_HEADER);

  let fields: Vec<&str> = lines[2].split(',').collect();
  assert_eq!(fields.len(), 7);
  assert_eq!(fields[0], "2");
  assert_eq!(fields[1], stats.records()[1].date);
  assert_eq!(fields[2], stats.records()[1].time);
  assert_eq!(fields[3], "2");
  assert_eq!(fields[4], "苹果核;塑料瓶");
  assert_eq!(fields[5], "A;B");
  assert_eq!(fields[6], "15.0");
  Ok(())
}

#[test]
fn default_export_lands_in_export_dir() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let mut stats = StatisticsAggregator::open(dir.path().join("data").join("statistics.json"), catalog()?)
    .with_export_dir(dir.path().join("exports"));
  stats.record(&detections(&[1]));

  let written = stats.export_csv(None)?;
  assert_eq!(written.parent(), Some(dir.path().join("exports").as_path()));
  let name = written.file_name().and_then(|n| n.to_str()).unwrap_or_default();
  assert!(name.starts_with("statistics_export_"));
  assert!(name.ends_with(".csv"));
  Ok(())
}

#[test]
fn records_survive_reload_and_ids_keep_increasing() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let path = dir.path().join("statistics.json");

  let mut first = StatisticsAggregator::open(&path, catalog()?);
  first.record(&detections(&[0]));
  first.record(&detections(&[1, 1]));
  let saved = first.records().to_vec();
  drop(first);

  let mut second = StatisticsAggregator::open(&path, catalog()?);
  assert_eq!(second.records(), saved.as_slice());

  let recorded = second.record(&detections(&[0])).expect("recorded");
  assert_eq!(recorded.record.id, 3);
  Ok(())
}

#[test]
fn clear_empties_log_and_restarts_ids() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let path = dir.path().join("statistics.json");
  let mut stats = StatisticsAggregator::open(&path, catalog()?);
  stats.record(&detections(&[0]));
  stats.record(&detections(&[1]));

  stats.clear()?;
  assert!(stats.is_empty());
  assert!(StatisticsAggregator::open(&path, catalog()?).is_empty());

  let recorded = stats.record(&detections(&[1])).expect("recorded");
  assert_eq!(recorded.record.id, 1);
  Ok(())
}

#[test]
fn corrupt_log_starts_empty_without_overwriting() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let path = dir.path().join("statistics.json");
  fs::write(&path, "[{\"id\": 1,")?;

  let stats = StatisticsAggregator::open(&path, catalog()?);
  assert!(stats.is_empty());
  assert_eq!(fs::read_to_string(&path)?, "[{\"id\": 1,");
  Ok(())
}

#[test]
fn missing_log_starts_empty() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let stats = StatisticsAggregator::open(dir.path().join("absent.json"), catalog()?);
  assert!(stats.is_empty());
  assert_eq!(stats.snapshot().total_detections, 0);
  Ok(())
}

#[test]
fn persistence_failure_keeps_record_in_memory() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let blocker = dir.path().join("blocker");
  fs::write(&blocker, "not a directory")?;

  let mut stats = StatisticsAggregator::open(blocker.join("statistics.json"), catalog()?);
  let recorded = stats.record(&detections(&[0])).expect("recorded in memory");

  assert!(recorded.persistence.is_err());
  assert_eq!(stats.len(), 1);
  assert_eq!(stats.category_totals().get("A"), Some(&1));
  Ok(())
}
