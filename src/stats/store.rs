// 该文件是 Fenlei （分类） 项目的一部分。
// src/stats/store.rs - 统计记录的 JSON 文件存储
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
  fs::{self, File},
  io::Write,
  path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::stats::{PersistenceError, StatRecord};

/// 整个记录日志保存为一个 JSON 数组，每次写入完整替换
#[derive(Debug, Clone)]
pub struct JsonLogStore {
  path: PathBuf,
}

impl JsonLogStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    JsonLogStore { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 文件不存在或内容损坏时返回空日志，原文件保持不动
  pub fn load(&self) -> Vec<StatRecord> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        info!("统计文件不存在，从空记录开始: {}", self.path.display());
        return Vec::new();
      }
      Err(e) => {
        warn!("读取统计文件失败，从空记录开始: {}: {}", self.path.display(), e);
        return Vec::new();
      }
    };

    match serde_json::from_str::<Vec<StatRecord>>(&content) {
      Ok(records) => {
        debug!("载入 {} 条统计记录", records.len());
        records
      }
      Err(e) => {
        warn!("统计文件格式错误，从空记录开始: {}: {}", self.path.display(), e);
        Vec::new()
      }
    }
  }

  /// 先写临时文件再改名，写入中断不会留下半截文件
  pub fn save(&self, records: &[StatRecord]) -> Result<(), PersistenceError> {
    let data = serde_json::to_vec_pretty(records)?;

    let io_error = |source| PersistenceError::IoError {
      path: self.path.clone(),
      source,
    };

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(io_error)?;
    }

    let tmp_path = self.path.with_extension("json.tmp");
    {
      let mut file = File::create(&tmp_path).map_err(io_error)?;
      file.write_all(&data).map_err(io_error)?;
      file.sync_all().map_err(io_error)?;
    }
    fs::rename(&tmp_path, &self.path).map_err(io_error)?;

    debug!("保存 {} 条统计记录到 {}", records.len(), self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stats::RecordItem;

  fn sample(id: u64) -> StatRecord {
    StatRecord {
      id,
      timestamp: "2026-03-01T08:30:00+08:00".to_string(),
      date: "2026-03-01".to_string(),
      time: "08:30:00".to_string(),
      total_count: 1,
      items: vec![RecordItem {
        class_id: 19,
        name: "易拉罐".to_string(),
        category: Some("可回收物".to_string()),
        confidence: 0.873,
      }],
      elapsed_ms: 12.5,
    }
  }

  #[test]
  fn round_trips_records() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = JsonLogStore::new(dir.path().join("nested").join("statistics.json"));
    let records = vec![sample(1), sample(2)];
    store.save(&records)?;

    assert_eq!(store.load(), records);
    let text = fs::read_to_string(store.path())?;
    assert!(text.contains("易拉罐"));
    assert!(!store.path().with_extension("json.tmp").exists());
    Ok(())
  }

  #[test]
  fn measured_timings_reload_bit_exact() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = JsonLogStore::new(dir.path().join("statistics.json"));

    let timings = [
      62.106226002999996,
      0.1 + 0.2,
      1.0 / 3.0 * 1000.0,
      std::f64::consts::PI * 17.0,
    ];
    let records: Vec<StatRecord> = timings
      .iter()
      .enumerate()
      .map(|(i, &elapsed_ms)| {
        let mut record = sample(i as u64 + 1);
        record.elapsed_ms = elapsed_ms;
        record.items[0].confidence = 0.873_451_2 + i as f32 * 1e-7;
        record
      })
      .collect();
    store.save(&records)?;

    let loaded = store.load();
    assert_eq!(loaded, records);
    for (saved, reloaded) in records.iter().zip(&loaded) {
      assert_eq!(saved.elapsed_ms.to_bits(), reloaded.elapsed_ms.to_bits());
    }
    Ok(())
  }

  #[test]
  fn corrupt_file_loads_empty_and_is_left_alone() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("statistics.json");
    fs::write(&path, "{ not json")?;

    let store = JsonLogStore::new(&path);
    assert!(store.load().is_empty());
    assert_eq!(fs::read_to_string(&path)?, "{ not json");
    Ok(())
  }

  #[test]
  fn missing_file_loads_empty() {
    let store = JsonLogStore::new("/nonexistent/fenlei/statistics.json");
    assert!(store.load().is_empty());
  }

  #[test]
  fn tolerates_missing_optional_fields() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("statistics.json");
    fs::write(
      &path,
      r#"[{"id": 4, "timestamp": "x", "date": "2026-03-01", "time": "08:00:00", "items": [{"class_id": 3, "name": "电池"}]}]"#,
    )?;

    let records = JsonLogStore::new(&path).load();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].items[0].category, None);
    assert_eq!(records[0].items[0].category_or("其他垃圾"), "其他垃圾");
    Ok(())
  }
}
