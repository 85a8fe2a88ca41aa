// 该文件是 Fenlei （分类） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::info;

use crate::{
  catalog::ClassCatalog,
  model::{BoundingBox, DetectionSet},
  output::OutputError,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: u32 = 4;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

/// 在画面上绘制检测框，框的颜色取自类别所属分类
///
/// 未加载字体时只绘制检测框；中文标签需要提供包含 CJK 字形的字体。
pub struct Annotator {
  font: Option<FontVec>,
  font_size: f32,
  thickness: i32,
}

impl Default for Annotator {
  fn default() -> Self {
    Annotator {
      font: None,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Annotator {
  pub fn with_font_file(path: &Path) -> Result<Self, OutputError> {
    info!("加载标注字体: {}", path.display());
    let data = std::fs::read(path)?;
    Self::with_font_bytes(data)
  }

  pub fn with_font_bytes(data: Vec<u8>) -> Result<Self, OutputError> {
    let font = FontVec::try_from_vec(data).map_err(|_| OutputError::InvalidFont)?;
    Ok(Annotator {
      font: Some(font),
      ..Annotator::default()
    })
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn annotate(
    &self,
    image: &RgbImage,
    detections: &DetectionSet,
    catalog: &ClassCatalog,
  ) -> RgbImage {
    let mut canvas = image.clone();
    self.draw_on(&mut canvas, detections, catalog);
    canvas
  }

  pub fn draw_on(&self, image: &mut RgbImage, detections: &DetectionSet, catalog: &ClassCatalog) {
    for detection in detections.iter() {
      let label = catalog.resolve(detection.class_id());
      let text = format!("{} {:.2}", label.display_name, detection.confidence());
      self.draw_bbox_with_label(image, detection.bbox(), &text, Rgb(label.rgb()));
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: BoundingBox, text: &str, color: Rgb<u8>) {
    // 边框向内加粗
    for inset in 0..self.thickness {
      let width = bbox.width() as i32 - 2 * inset;
      let height = bbox.height() as i32 - 2 * inset;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(bbox.x1() + inset, bbox.y1() + inset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, text);
    let label_width = text_width + 2 * LABEL_TEXT_HORIZONTAL_PADDING;
    let label_height = text_height + 2 * LABEL_TEXT_VERTICAL_PADDING as u32;

    // 标签放在边框上方，空间不足时贴住画面顶部
    let label_x = bbox.x1().max(0);
    let label_y = (bbox.y1() - label_height as i32).max(0);
    let max_width = (image.width() as i32 - label_x).max(0) as u32;
    let label_width = label_width.min(max_width);

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        label_x + LABEL_TEXT_HORIZONTAL_PADDING as i32,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        text,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    catalog::{BuiltinCatalog, color_rgb},
    frame::FrameSize,
    model::Detection,
  };

  #[test]
  fn draws_box_in_category_color() {
    let catalog = ClassCatalog::builtin(BuiltinCatalog::Basic).unwrap();
    let image = RgbImage::new(20, 20);
    let bbox = BoundingBox::new(2, 3, 12, 15).unwrap();
    let set = DetectionSet::new(vec![Detection::new(bbox, 3, 0.8)], 1.0, FrameSize::new(20, 20));

    let annotated = Annotator::default().annotate(&image, &set, &catalog);

    let red = Rgb(color_rgb("red"));
    assert_eq!(*annotated.get_pixel(2, 3), red);
    assert_eq!(*annotated.get_pixel(3, 4), red);
    assert_eq!(*annotated.get_pixel(11, 14), red);
    assert_eq!(*annotated.get_pixel(7, 9), Rgb([0, 0, 0]));
    // 原图保持不变
    assert_eq!(*image.get_pixel(2, 3), Rgb([0, 0, 0]));
  }

  #[test]
  fn rejects_invalid_font() {
    assert!(matches!(
      Annotator::with_font_bytes(vec![1, 2, 3]),
      Err(OutputError::InvalidFont)
    ));
  }
}
