// 该文件是 Fenlei （分类） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的视频帧编码保存为视频文件，分辨率与帧率跟随输入源。
//!
//! ## 支持的格式
//!
//! - **MP4** (H.264) - 默认格式
//! - **MKV** (Matroska)
//! - **AVI**
//! - **WebM** (VP8)

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  frame::FrameSize,
  output::{OutputError, OutputWriter},
};

const EOS_TIMEOUT_SECONDS: u64 = 5;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
}

fn encoder_for(path: &str) -> String {
  let lower = path.to_lowercase();
  if lower.ends_with(".mkv") {
    format!(
      "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux ! filesink location=\"{}\"",
      path
    )
  } else if lower.ends_with(".avi") {
    format!(
      "videoconvert ! video/x-raw,format=I420 ! x264enc ! avimux ! filesink location=\"{}\"",
      path
    )
  } else if lower.ends_with(".webm") {
    format!(
      "videoconvert ! vp8enc ! webmmux ! filesink location=\"{}\"",
      path
    )
  } else {
    format!(
      "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux ! filesink location=\"{}\"",
      path
    )
  }
}

/// GStreamer 视频文件输出
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  size: FrameSize,
  fps: gst::Fraction,
  frame_count: u64,
  finished: bool,
}

impl GStreamerVideoOutput {
  pub fn create(path: &Path, size: FrameSize, fps: f64) -> Result<Self, GStreamerVideoOutputError> {
    gst::init()?;

    let file_path = path.to_string_lossy();
    let pipeline_desc = format!("appsrc name=src ! {}", encoder_for(&file_path));
    info!("创建录像管道: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    // 帧率以千分之一精度表示，兼容 29.97 等非整数帧率
    let fps = gst::Fraction::new((fps * 1000.0).round().max(1.0) as i32, 1000);
    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", size.width as i32)
      .field("height", size.height as i32)
      .field("framerate", fps)
      .build();

    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "录像输出已初始化: {}x{} @ {} fps -> {}",
      size.width, size.height, fps, file_path
    );

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      size,
      fps,
      frame_count: 0,
      finished: false,
    })
  }

  fn frame_duration_ns(&self) -> u64 {
    (1_000_000_000u64 * self.fps.denom() as u64) / self.fps.numer().max(1) as u64
  }

  fn push_frame(&mut self, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let mut buffer =
      gst::Buffer::with_size(data.len()).map_err(|_| GStreamerVideoOutputError::BufferCreationError)?;

    let duration = self.frame_duration_ns();
    let timestamp = self.frame_count * duration;
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
      let mut buffer_map = buffer_ref.map_writable().map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to map buffer".to_string())
      })?;
      buffer_map.copy_from_slice(data);
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }

  fn close(&mut self) -> Result<(), GStreamerVideoOutputError> {
    if self.finished {
      return Ok(());
    }
    self.finished = true;

    // 发送 EOS 后等待封装器写完文件尾
    let _ = self.appsrc.end_of_stream();
    if let Some(bus) = self.pipeline.bus() {
      let message = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECONDS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
      if let Some(message) = message
        && let gst::MessageView::Error(err) = message.view()
      {
        error!("录像管道错误: {}", err.error());
      }
    }
    self.pipeline.set_state(gst::State::Null)?;

    info!("录像输出已关闭，共写入 {} 帧", self.frame_count);
    Ok(())
  }
}

impl OutputWriter for GStreamerVideoOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    let actual = FrameSize::new(image.width(), image.height());
    if actual != self.size {
      return Err(OutputError::SizeMismatch {
        expected: self.size,
        actual,
      });
    }
    self.push_frame(image.as_raw())?;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    self.close()?;
    Ok(())
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      warn!("关闭录像管道失败: {}", e);
    }
  }
}
