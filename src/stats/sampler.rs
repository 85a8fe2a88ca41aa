// 该文件是 Fenlei （分类） 项目的一部分。
// src/stats/sampler.rs - 连续输入的统计抽样
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

use crate::model::DetectionSet;

/// 按帧号每 N 帧选取一帧写入统计，空结果不选取
///
/// 以 `Published::frame_index` 计数，`Delivery::Latest` 下被替换掉的帧同样计入间隔；
/// 应选的帧被替换时，改选随后收到的第一帧。
#[derive(Debug, Clone)]
pub struct FrameSampler {
  interval: u32,
  next_due: u64,
}

impl FrameSampler {
  /// `interval` 为 0 时按 1 处理
  pub fn new(interval: u32) -> Self {
    let interval = interval.max(1);
    FrameSampler {
      interval,
      next_due: interval as u64,
    }
  }

  pub fn interval(&self) -> u32 {
    self.interval
  }

  /// 新的一次运行从帧号 0 重新计数
  pub fn reset(&mut self) {
    self.next_due = self.interval as u64;
  }

  /// 每收到一帧调用一次，`frame_index` 从 0 开始
  pub fn sample<'a>(
    &mut self,
    frame_index: u64,
    detections: &'a DetectionSet,
  ) -> Option<&'a DetectionSet> {
    let position = frame_index + 1;
    if position < self.next_due {
      return None;
    }
    let interval = self.interval as u64;
    self.next_due = (position / interval + 1) * interval;
    (!detections.is_empty()).then_some(detections)
  }
}
