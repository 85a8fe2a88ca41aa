// 该文件是 Fenlei （分类） 项目的一部分。
// src/output.rs - 输出定义
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
use thiserror::Error;

use crate::frame::FrameSize;

pub mod draw;
mod save_image_file;

pub use self::draw::Annotator;
pub use self::save_image_file::SaveImageFileOutput;

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体文件无效")]
  InvalidFont,
  #[error("帧尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  SizeMismatch { expected: FrameSize, actual: FrameSize },
  #[error("当前构建不支持录像，请启用 gstreamer_output 特性")]
  Unsupported,
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
}

/// 逐帧写入标注后画面的输出
pub trait OutputWriter {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError>;

  /// 完成写入并释放资源
  fn finish(&mut self) -> Result<(), OutputError>;
}

/// 在检测线程内按输入源的分辨率与帧率创建录像输出
pub trait RecorderFactory: Send + Sync {
  fn open(&self, size: FrameSize, fps: f64) -> Result<Box<dyn OutputWriter + Send>, OutputError>;

  fn describe(&self) -> String;
}

/// 录像到视频文件
#[derive(Debug, Clone)]
pub struct VideoFileRecorder {
  path: PathBuf,
}

impl VideoFileRecorder {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    VideoFileRecorder { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl RecorderFactory for VideoFileRecorder {
  #[cfg(feature = "gstreamer_output")]
  fn open(&self, size: FrameSize, fps: f64) -> Result<Box<dyn OutputWriter + Send>, OutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let output = GStreamerVideoOutput::create(&self.path, size, fps)?;
    Ok(Box::new(output))
  }

  #[cfg(not(feature = "gstreamer_output"))]
  fn open(&self, _size: FrameSize, _fps: f64) -> Result<Box<dyn OutputWriter + Send>, OutputError> {
    Err(OutputError::Unsupported)
  }

  fn describe(&self) -> String {
    self.path.display().to_string()
  }
}
