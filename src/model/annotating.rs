// 该文件是 Fenlei （分类） 项目的一部分。
// src/model/annotating.rs - 检测器适配层
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

use std::{sync::Arc, time::Instant};

use tracing::debug;

use crate::{
  catalog::ClassCatalog,
  frame::Frame,
  model::{Detection, DetectionSet, Detector, DetectorError, Inference, Model},
  output::Annotator,
};

/// 把 [`Model`] 包装为 [`Detector`]：计时、校验检测框并生成标注画面
pub struct AnnotatingDetector<M> {
  model: M,
  annotator: Annotator,
  catalog: Arc<ClassCatalog>,
}

impl<M: Model> AnnotatingDetector<M> {
  pub fn new(model: M, catalog: Arc<ClassCatalog>) -> Self {
    AnnotatingDetector {
      model,
      annotator: Annotator::default(),
      catalog,
    }
  }

  pub fn with_annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = annotator;
    self
  }

  pub fn catalog(&self) -> &Arc<ClassCatalog> {
    &self.catalog
  }
}

impl<M: Model + Send> Detector for AnnotatingDetector<M> {
  fn detect(&mut self, frame: &Frame) -> Result<Inference, DetectorError> {
    let now = Instant::now();
    let raw = self.model.infer(frame).map_err(DetectorError::inference)?;
    let elapsed = now.elapsed();

    let size = frame.size();
    let mut items = Vec::with_capacity(raw.len());
    for item in raw.iter() {
      match Detection::from_raw(item, size) {
        Some(detection) => items.push(detection),
        None => debug!("丢弃无效检测框: {:?}", item),
      }
    }

    let detections = DetectionSet::new(items, elapsed.as_secs_f64() * 1000.0, size);
    debug!("第 {} 帧: {}", frame.index(), detections.summary_line());

    let annotated = self
      .annotator
      .annotate(frame.image(), &detections, &self.catalog);
    Ok(Inference {
      detections,
      annotated,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{catalog::BuiltinCatalog, model::RawDetection};

  struct FixedModel(Vec<RawDetection>);

  impl Model for FixedModel {
    type Error = std::io::Error;

    fn infer(&self, _input: &Frame) -> Result<Vec<RawDetection>, Self::Error> {
      Ok(self.0.clone())
    }
  }

  struct BrokenModel;

  impl Model for BrokenModel {
    type Error = std::io::Error;

    fn infer(&self, _input: &Frame) -> Result<Vec<RawDetection>, Self::Error> {
      Err(std::io::Error::other("tensor shape mismatch"))
    }
  }

  fn catalog() -> Arc<ClassCatalog> {
    Arc::new(ClassCatalog::builtin(BuiltinCatalog::Basic).unwrap())
  }

  #[test]
  fn drops_degenerate_boxes() {
    let model = FixedModel(vec![
      RawDetection {
        class_id: 2,
        score: 0.9,
        bbox: [1.0, 1.0, 10.0, 10.0],
      },
      RawDetection {
        class_id: 1,
        score: 0.8,
        bbox: [5.0, 5.0, 5.0, 9.0],
      },
    ]);
    let mut detector = AnnotatingDetector::new(model, catalog());
    let inference = detector.detect(&Frame::blank(32, 32)).unwrap();

    assert_eq!(inference.detections.len(), 1);
    assert_eq!(inference.detections.items()[0].class_id(), 2);
    assert_eq!(inference.annotated.dimensions(), (32, 32));
    assert!(inference.detections.elapsed_ms() >= 0.0);
  }

  #[test]
  fn model_errors_become_detector_failures() {
    let mut detector = AnnotatingDetector::new(BrokenModel, catalog());
    assert!(matches!(
      detector.detect(&Frame::blank(8, 8)),
      Err(DetectorError::Inference(_))
    ));
    assert!(detector.warm_up().is_err());
  }

  #[test]
  fn warm_up_runs_on_blank_frame() {
    let mut detector = AnnotatingDetector::new(FixedModel(Vec::new()), catalog());
    detector.warm_up().unwrap();
  }
}
