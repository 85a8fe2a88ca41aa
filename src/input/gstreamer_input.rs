// 该文件是 Fenlei （分类） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入模块
//!
//! 使用 `decodebin` 解码视频文件，输出 RGB 帧。打开时先预卷（preroll）以取得
//! 分辨率与帧率，解码失败（文件损坏、缺少解码器）在打开阶段即报告。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! 在 `Cargo.toml` 中启用 `gstreamer_input` 特性。

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{Frame, FrameSize},
  input::{FrameSource, InputError, SourceKind},
  pipeline::CancelToken,
};

const GSTREAMER_INPUT_SCHEME: &str = "video";
const PREROLL_TIMEOUT_SECONDS: u64 = 10;
const PULL_TIMEOUT_MILLISECONDS: u64 = 100;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// GStreamer 视频文件输入
pub struct GStreamerInput {
  path: PathBuf,
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  size: FrameSize,
  fps: Option<f64>,
  frame_index: u64,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  pub fn open(path: &Path) -> Result<Self, InputError> {
    if !path.is_file() {
      return Err(InputError::NotFound(path.to_path_buf()));
    }
    Ok(Self::build(path)?)
  }

  fn build(path: &Path) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    // 视频文件的每一帧都要检测，appsink 不丢帧，由 max-buffers 反压解码
    let description = format!(
      "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink max-buffers=2 drop=false sync=false",
      path.display()
    );
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Paused)?;
    let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECONDS));
    if let Err(e) = result {
      let _ = pipeline.set_state(gst::State::Null);
      return Err(GStreamerInputError::StateChangeError(e));
    }

    let caps = appsink
      .static_pad("sink")
      .and_then(|pad| pad.current_caps())
      .ok_or(GStreamerInputError::VideoInfoError)?;
    let video_info =
      gst_video::VideoInfo::from_caps(&caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let framerate = video_info.fps();
    let fps = (framerate.numer() > 0 && framerate.denom() > 0)
      .then(|| framerate.numer() as f64 / framerate.denom() as f64);
    let size = FrameSize::new(video_info.width(), video_info.height());

    pipeline.set_state(gst::State::Playing)?;
    info!(
      "打开视频 {} ({}x{}, {} fps)",
      path.display(),
      size.width,
      size.height,
      fps.map(|fps| format!("{:.2}", fps)).unwrap_or_else(|| "未知".to_string())
    );

    Ok(GStreamerInput {
      path: path.to_path_buf(),
      pipeline,
      appsink,
      size,
      fps,
      frame_index: 0,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn bus_error(&self) -> Option<GStreamerInputError> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(GStreamerInputError::PipelineError(
        err.error().to_string(),
      )),
      _ => None,
    }
  }
}

impl FromUrl for GStreamerInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != GSTREAMER_INPUT_SCHEME {
      return Err(InputError::SchemeMismatch);
    }
    GStreamerInput::open(Path::new(&decoded_path(url)))
  }
}

impl FromUrlWithScheme for GStreamerInput {
  const SCHEME: &'static str = GSTREAMER_INPUT_SCHEME;
}

impl FrameSource for GStreamerInput {
  fn kind(&self) -> SourceKind {
    SourceKind::Video
  }

  fn next_frame(&mut self, cancel: &CancelToken) -> Result<Option<Frame>, InputError> {
    loop {
      if cancel.is_cancelled() {
        return Ok(None);
      }

      let timeout = gst::ClockTime::from_mseconds(PULL_TIMEOUT_MILLISECONDS);
      if let Some(sample) = self.appsink.try_pull_sample(timeout) {
        let image = convert_sample(&sample)?;
        let index = self.frame_index;
        self.frame_index += 1;
        let timestamp_ms = sample
          .buffer()
          .and_then(|buffer| buffer.pts())
          .map(|pts| pts.mseconds())
          .unwrap_or_default();
        return Ok(Some(Frame::new(image, index, timestamp_ms)));
      }

      if self.appsink.is_eos() {
        info!("视频 {} 播放结束，共 {} 帧", self.path.display(), self.frame_index);
        return Ok(None);
      }
      if let Some(err) = self.bus_error() {
        return Err(err.into());
      }
    }
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }

  fn size(&self) -> Option<FrameSize> {
    Some(self.size)
  }
}

/// 按行拷贝，去掉 GStreamer 的行对齐填充
fn convert_sample(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width * 3;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected = stride * (height.saturating_sub(1)) + row_bytes;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  for row in 0..height {
    let start = row * stride;
    pixels.extend_from_slice(&data[start..start + row_bytes]);
  }

  RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: row_bytes * height,
      actual: data.len(),
    },
  )
}
