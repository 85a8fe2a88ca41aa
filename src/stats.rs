// 该文件是 Fenlei （分类） 项目的一部分。
// src/stats.rs - 检测统计
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
  path::PathBuf,
  sync::{Arc, Mutex, MutexGuard},
};

use thiserror::Error;

mod aggregator;
mod record;
mod sampler;
mod store;

pub use self::aggregator::{
  CSV_HEADER, Recorded, StatisticsAggregator, StatisticsSnapshot, TodaySummary, TotalSummary,
};
pub use self::record::{DATE_FORMAT, RecordItem, StatRecord, TIME_FORMAT};
pub use self::sampler::FrameSampler;
pub use self::store::JsonLogStore;

use crate::model::DetectionSet;

/// 统计文件写入失败，内存中的记录不受影响
#[derive(Error, Debug)]
pub enum PersistenceError {
  #[error("写入统计文件 {path} 失败: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("序列化统计记录失败: {0}")]
  SerializeError(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
  #[error("导出 CSV 到 {path} 失败: {source}")]
  ExportFailed {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 多个写入方（单张检测与视频抽样）共享同一份统计时使用，写入串行进行
#[derive(Clone)]
pub struct SharedStatistics {
  inner: Arc<Mutex<StatisticsAggregator>>,
}

impl SharedStatistics {
  pub fn new(aggregator: StatisticsAggregator) -> Self {
    SharedStatistics {
      inner: Arc::new(Mutex::new(aggregator)),
    }
  }

  /// 每次修改都是完整的一步，锁中毒后数据仍然一致
  pub fn lock(&self) -> MutexGuard<'_, StatisticsAggregator> {
    self
      .inner
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn record(&self, detections: &DetectionSet) -> Option<Recorded> {
    self.lock().record(detections)
  }

  pub fn snapshot(&self) -> StatisticsSnapshot {
    self.lock().snapshot()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    catalog::{BuiltinCatalog, ClassCatalog},
    frame::FrameSize,
    model::{BoundingBox, Detection},
  };

  #[test]
  fn concurrent_writers_get_unique_ids() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let catalog = Arc::new(ClassCatalog::builtin(BuiltinCatalog::Basic)?);
    let shared = SharedStatistics::new(StatisticsAggregator::open(
      dir.path().join("statistics.json"),
      catalog.clone(),
    ));

    let handles: Vec<_> = (0..4)
      .map(|worker| {
        let shared = shared.clone();
        std::thread::spawn(move || {
          let bbox = BoundingBox::new(0, 0, 4, 4).unwrap();
          let set = DetectionSet::new(vec![Detection::new(bbox, worker, 0.7)], 1.0, FrameSize::new(8, 8));
          for _ in 0..5 {
            shared.record(&set);
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().map_err(|_| "writer panicked")?;
    }

    let mut ids: Vec<u64> = shared.lock().records().iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());

    let reloaded = StatisticsAggregator::open(dir.path().join("statistics.json"), catalog);
    assert_eq!(reloaded.len(), 20);
    Ok(())
  }
}
