// 该文件是 Fenlei （分类） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};

pub const RGB_CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
  pub width: u32,
  pub height: u32,
}

impl FrameSize {
  pub fn new(width: u32, height: u32) -> Self {
    FrameSize { width, height }
  }
}

/// 一帧输入图像，像素按 NHWC 排列，通道顺序固定为 R、G、B
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
  index: u64,
  timestamp_ms: u64,
  origin: Option<PathBuf>,
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::new(image, 0, 0)
  }
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Frame {
      image,
      index,
      timestamp_ms,
      origin: None,
    }
  }

  /// 纯黑帧，用于模型预热
  pub fn blank(width: u32, height: u32) -> Self {
    Frame::from(RgbImage::new(width, height))
  }

  pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
    self.origin = Some(origin.into());
    self
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn timestamp_ms(&self) -> u64 {
    self.timestamp_ms
  }

  /// 帧所来自的文件（图片输入时有效）
  pub fn origin(&self) -> Option<&Path> {
    self.origin.as_deref()
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn size(&self) -> FrameSize {
    FrameSize::new(self.image.width(), self.image.height())
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_frame_has_rgb_layout() {
    let frame = Frame::blank(4, 3);
    assert_eq!(frame.size(), FrameSize::new(4, 3));
    assert_eq!(frame.as_nhwc().len(), 4 * 3 * RGB_CHANNELS);
    assert!(frame.origin().is_none());
  }

  #[test]
  fn origin_is_kept() {
    let frame = Frame::blank(1, 1).with_origin("a/b.png");
    assert_eq!(frame.origin(), Some(Path::new("a/b.png")));
  }
}
