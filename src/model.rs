// 该文件是 Fenlei （分类） 项目的一部分。
// src/model.rs - 检测模型与检测结果
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

use image::RgbImage;
use thiserror::Error;

use crate::{
  catalog::{ClassCatalog, ClassLabel},
  frame::{Frame, FrameSize},
};

/// 模型预热所用的输入尺寸
pub const WARM_UP_SIZE: u32 = 48;

/// 模型原始输出
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &Frame) -> Result<Vec<RawDetection>, Self::Error>;
}

/// 模型直接给出的检测项，坐标为像素坐标 `[x_min, y_min, x_max, y_max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
  x1: i32,
  y1: i32,
  x2: i32,
  y2: i32,
}

impl BoundingBox {
  /// 坐标需满足 `x1 < x2` 且 `y1 < y2`
  pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
    if x1 < x2 && y1 < y2 {
      Some(BoundingBox { x1, y1, x2, y2 })
    } else {
      None
    }
  }

  /// 由浮点坐标取整并裁剪到画面范围内
  pub fn from_f32_clamped(bbox: [f32; 4], size: FrameSize) -> Option<Self> {
    if bbox.iter().any(|v| !v.is_finite()) {
      return None;
    }
    let (w, h) = (size.width as i32, size.height as i32);
    let x1 = (bbox[0].floor() as i32).clamp(0, w);
    let y1 = (bbox[1].floor() as i32).clamp(0, h);
    let x2 = (bbox[2].ceil() as i32).clamp(0, w);
    let y2 = (bbox[3].ceil() as i32).clamp(0, h);
    Self::new(x1, y1, x2, y2)
  }

  pub fn x1(&self) -> i32 {
    self.x1
  }

  pub fn y1(&self) -> i32 {
    self.y1
  }

  pub fn x2(&self) -> i32 {
    self.x2
  }

  pub fn y2(&self) -> i32 {
    self.y2
  }

  pub fn width(&self) -> u32 {
    (self.x2 - self.x1) as u32
  }

  pub fn height(&self) -> u32 {
    (self.y2 - self.y1) as u32
  }

  pub fn as_array(&self) -> [i32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

impl std::fmt::Display for BoundingBox {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  bbox: BoundingBox,
  class_id: u32,
  confidence: f32,
}

impl Detection {
  /// 置信度被限制在 `[0, 1]`，非数值按 0 处理
  pub fn new(bbox: BoundingBox, class_id: u32, confidence: f32) -> Self {
    let confidence = if confidence.is_nan() {
      0.0
    } else {
      confidence.clamp(0.0, 1.0)
    };
    Detection {
      bbox,
      class_id,
      confidence,
    }
  }

  pub fn from_raw(raw: &RawDetection, size: FrameSize) -> Option<Self> {
    BoundingBox::from_f32_clamped(raw.bbox, size).map(|bbox| Self::new(bbox, raw.class_id, raw.score))
  }

  pub fn bbox(&self) -> BoundingBox {
    self.bbox
  }

  pub fn class_id(&self) -> u32 {
    self.class_id
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  /// 例如 `87.50 %`
  pub fn confidence_label(&self) -> String {
    format!("{:.2} %", self.confidence * 100.0)
  }
}

/// 一次推理得到的全部检测项，创建后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSet {
  items: Box<[Detection]>,
  elapsed_ms: f64,
  frame_size: FrameSize,
}

impl DetectionSet {
  pub fn new(items: Vec<Detection>, elapsed_ms: f64, frame_size: FrameSize) -> Self {
    DetectionSet {
      items: items.into_boxed_slice(),
      elapsed_ms,
      frame_size,
    }
  }

  pub fn empty(frame_size: FrameSize) -> Self {
    Self::new(Vec::new(), 0.0, frame_size)
  }

  pub fn items(&self) -> &[Detection] {
    &self.items
  }

  pub fn iter(&self) -> impl Iterator<Item = &Detection> {
    self.items.iter()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn elapsed_ms(&self) -> f64 {
    self.elapsed_ms
  }

  pub fn frame_size(&self) -> FrameSize {
    self.frame_size
  }

  pub fn labels(&self, catalog: &ClassCatalog) -> Vec<ClassLabel> {
    self.items.iter().map(|d| catalog.resolve(d.class_id)).collect()
  }

  /// 每个检测项一行分类指导
  pub fn guidance(&self, catalog: &ClassCatalog) -> Vec<String> {
    self.labels(catalog).iter().map(ClassLabel::guidance).collect()
  }

  pub fn summary_line(&self) -> String {
    if self.is_empty() {
      format!("未检测到目标 | 耗时: {:.1}ms", self.elapsed_ms)
    } else {
      format!("检测到 {} 个目标 | 耗时: {:.1}ms", self.len(), self.elapsed_ms)
    }
  }
}

/// 检测器适配层的输出：检测结果与标注后的画面
#[derive(Debug, Clone)]
pub struct Inference {
  pub detections: DetectionSet,
  pub annotated: RgbImage,
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("检测器状态异常: {0}")]
  Poisoned(String),
}

impl DetectorError {
  pub fn inference<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    DetectorError::Inference(Box::new(e))
  }
}

/// 检测器适配层：逐帧同步调用，不会被并发调用
pub trait Detector: Send {
  fn detect(&mut self, frame: &Frame) -> Result<Inference, DetectorError>;

  /// 用小尺寸黑帧预热，避免首帧延迟过高
  fn warm_up(&mut self) -> Result<(), DetectorError> {
    let frame = Frame::blank(WARM_UP_SIZE, WARM_UP_SIZE);
    self.detect(&frame).map(|_| ())
  }
}

mod annotating;
mod replay;

pub use self::annotating::AnnotatingDetector;
pub use self::replay::{ReplayModel, ReplayModelError};
