// 该文件是 Fenlei （分类） 项目的一部分。
// src/model/replay.rs - 标注文件回放模型
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

//! 回放模型从图片旁的同名 `.txt` 标注文件中读取检测结果，
//! 不依赖神经网络即可驱动整条流水线。每行一个目标：
//!
//! ```text
//! # class_id, score, x_min, y_min, x_max, y_max
//! 19, 0.9132, 120, 48, 260, 210
//! 2, 0.8810, 0.1250, 0.2000, 0.3750, 0.6000
//! ```
//!
//! 四个坐标都不大于 1 时按归一化坐标处理。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{
  frame::{Frame, FrameSize},
  model::{Model, RawDetection},
};

const LABEL_EXTENSION: &str = "txt";
const FIELDS_PER_LINE: usize = 6;

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标注文件 {path} 第 {line} 行格式错误: {reason}")]
  ParseError {
    path: String,
    line: usize,
    reason: String,
  },
}

#[derive(Debug, Clone, Default)]
pub struct ReplayModel {
  fallback: Vec<RawDetection>,
}

impl ReplayModel {
  pub fn new() -> Self {
    Self::default()
  }

  /// 没有标注文件的帧（视频、摄像头）返回的检测结果
  pub fn with_fallback(mut self, fallback: Vec<RawDetection>) -> Self {
    self.fallback = fallback;
    self
  }

  pub fn sidecar_path(origin: &Path) -> PathBuf {
    origin.with_extension(LABEL_EXTENSION)
  }

  pub fn parse_labels(content: &str, size: FrameSize) -> Result<Vec<RawDetection>, (usize, String)> {
    let mut items = Vec::new();
    for (index, line) in content.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      let fields: Vec<&str> = line.split(',').map(str::trim).collect();
      if fields.len() != FIELDS_PER_LINE {
        return Err((
          index + 1,
          format!("期望 {} 个字段, 实际 {} 个", FIELDS_PER_LINE, fields.len()),
        ));
      }

      let class_id = fields[0]
        .parse::<u32>()
        .map_err(|e| (index + 1, format!("类别编号无效: {}", e)))?;
      let mut numbers = [0f32; 5];
      for (slot, field) in numbers.iter_mut().zip(&fields[1..]) {
        *slot = field
          .parse::<f32>()
          .map_err(|e| (index + 1, format!("数值无效 '{}': {}", field, e)))?;
      }

      let [score, x1, y1, x2, y2] = numbers;
      let mut bbox = [x1, y1, x2, y2];
      if bbox.iter().all(|v| *v <= 1.0) {
        bbox[0] *= size.width as f32;
        bbox[1] *= size.height as f32;
        bbox[2] *= size.width as f32;
        bbox[3] *= size.height as f32;
      }

      items.push(RawDetection {
        class_id,
        score,
        bbox,
      });
    }
    Ok(items)
  }
}

impl Model for ReplayModel {
  type Error = ReplayModelError;

  fn infer(&self, input: &Frame) -> Result<Vec<RawDetection>, Self::Error> {
    let Some(origin) = input.origin() else {
      return Ok(self.fallback.clone());
    };

    let sidecar = Self::sidecar_path(origin);
    if !sidecar.is_file() {
      debug!("未找到标注文件: {}", sidecar.display());
      return Ok(self.fallback.clone());
    }

    let content = std::fs::read_to_string(&sidecar)?;
    Self::parse_labels(&content, input.size()).map_err(|(line, reason)| {
      ReplayModelError::ParseError {
        path: sidecar.display().to_string(),
        line,
        reason,
      }
    })
  }
}
