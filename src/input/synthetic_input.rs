// 该文件是 Fenlei （分类） 项目的一部分。
// src/input/synthetic_input.rs - 模拟采集设备
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

//! 模拟设备生成带移动色块的画面，行为与真实摄像头一致：
//! 同一设备名同时只能被一个输入源占用，输入源释放后才能再次打开。
//!
//! ```text
//! synthetic://bench?width=320&height=240&fps=15&frames=120
//! ```

use std::{
  collections::{HashMap, HashSet},
  sync::{Mutex, OnceLock},
};

use image::{Rgb, RgbImage};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{Frame, FrameSize},
  input::{FrameSource, InputError, SourceKind},
  pipeline::CancelToken,
};

const SYNTHETIC_SCHEME: &str = "synthetic";
const DEFAULT_DEVICE: &str = "default";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

static OPEN_DEVICES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn open_devices() -> &'static Mutex<HashSet<String>> {
  OPEN_DEVICES.get_or_init(|| Mutex::new(HashSet::new()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
  pub device: String,
  pub width: u32,
  pub height: u32,
  /// `None` 表示设备不报告帧率
  pub fps: Option<f64>,
  /// `None` 表示无限帧
  pub frames: Option<u64>,
}

impl Default for SyntheticConfig {
  fn default() -> Self {
    SyntheticConfig {
      device: DEFAULT_DEVICE.to_string(),
      width: DEFAULT_WIDTH,
      height: DEFAULT_HEIGHT,
      fps: Some(30.0),
      frames: None,
    }
  }
}

impl SyntheticConfig {
  pub fn new(device: impl Into<String>) -> Self {
    SyntheticConfig {
      device: device.into(),
      ..Default::default()
    }
  }

  pub fn with_size(mut self, width: u32, height: u32) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  pub fn with_fps(mut self, fps: Option<f64>) -> Self {
    self.fps = fps;
    self
  }

  pub fn with_frames(mut self, frames: Option<u64>) -> Self {
    self.frames = frames;
    self
  }
}

impl FromUrl for SyntheticConfig {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != SYNTHETIC_SCHEME {
      return Err(InputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let device = decoded_path(url).trim_matches('/').to_string();
    let mut config = SyntheticConfig::new(if device.is_empty() {
      DEFAULT_DEVICE.to_string()
    } else {
      device
    });

    if let Some(width) = query.get("width").and_then(|v| v.parse::<u32>().ok()) {
      config.width = width;
    }
    if let Some(height) = query.get("height").and_then(|v| v.parse::<u32>().ok()) {
      config.height = height;
    }
    if let Some(fps) = query.get("fps") {
      config.fps = fps.parse::<f64>().ok().filter(|fps| *fps > 0.0);
    }
    if let Some(frames) = query.get("frames").and_then(|v| v.parse::<u64>().ok()) {
      config.frames = Some(frames);
    }

    if config.width == 0 || config.height == 0 {
      return Err(InputError::Unsupported(format!(
        "模拟设备分辨率无效: {}x{}",
        config.width, config.height
      )));
    }
    Ok(config)
  }
}

/// 独占一个模拟设备名，析构时释放
pub struct SyntheticInput {
  config: SyntheticConfig,
  produced: u64,
}

impl SyntheticInput {
  pub fn open(config: SyntheticConfig) -> Result<Self, InputError> {
    let mut devices = open_devices()
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if !devices.insert(config.device.clone()) {
      return Err(InputError::DeviceBusy(config.device));
    }
    info!(
      "打开模拟设备 {} ({}x{})",
      config.device, config.width, config.height
    );

    Ok(SyntheticInput {
      config,
      produced: 0,
    })
  }

  /// 设备当前是否被某个输入源占用
  pub fn is_device_open(device: &str) -> bool {
    open_devices()
      .lock()
      .map(|devices| devices.contains(device))
      .unwrap_or_else(|poisoned| poisoned.into_inner().contains(device))
  }

  pub fn config(&self) -> &SyntheticConfig {
    &self.config
  }

  fn render(&self, index: u64) -> RgbImage {
    let (width, height) = (self.config.width, self.config.height);
    let block = (width.min(height) / 4).max(1);
    let offset = (index as u32).wrapping_mul(7) % width.max(1);

    RgbImage::from_fn(width, height, |x, y| {
      let in_block = (x + width - offset) % width < block && y < block;
      if in_block {
        Rgb([240, 240, 240])
      } else {
        Rgb([(x % 256) as u8, (y % 256) as u8, (index % 256) as u8])
      }
    })
  }
}

impl FromUrl for SyntheticInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    SyntheticInput::open(SyntheticConfig::from_url(url)?)
  }
}

impl FromUrlWithScheme for SyntheticInput {
  const SCHEME: &'static str = SYNTHETIC_SCHEME;
}

impl FrameSource for SyntheticInput {
  fn kind(&self) -> SourceKind {
    SourceKind::Synthetic
  }

  fn next_frame(&mut self, _cancel: &CancelToken) -> Result<Option<Frame>, InputError> {
    if let Some(limit) = self.config.frames
      && self.produced >= limit
    {
      return Ok(None);
    }

    let index = self.produced;
    let timestamp_ms = match self.config.fps {
      Some(fps) => (index as f64 * 1000.0 / fps) as u64,
      None => 0,
    };
    self.produced += 1;
    Ok(Some(Frame::new(self.render(index), index, timestamp_ms)))
  }

  fn fps(&self) -> Option<f64> {
    self.config.fps
  }

  fn size(&self) -> Option<FrameSize> {
    Some(FrameSize::new(self.config.width, self.config.height))
  }
}

impl Drop for SyntheticInput {
  fn drop(&mut self) {
    let mut devices = open_devices()
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    devices.remove(&self.config.device);
    debug!("释放模拟设备 {}", self.config.device);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_query_parameters() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse("synthetic://bench?width=32&height=16&fps=12.5&frames=3")?;
    let config = SyntheticConfig::from_url(&url)?;
    assert_eq!(config.device, "bench");
    assert_eq!((config.width, config.height), (32, 16));
    assert_eq!(config.fps, Some(12.5));
    assert_eq!(config.frames, Some(3));

    let url = Url::parse("synthetic://nofps?fps=none")?;
    assert_eq!(SyntheticConfig::from_url(&url)?.fps, None);
    Ok(())
  }

  #[test]
  fn device_is_exclusive_until_dropped() -> Result<(), InputError> {
    let config = SyntheticConfig::new("synthetic-input-exclusive").with_size(8, 8);
    let first = SyntheticInput::open(config.clone())?;
    assert!(SyntheticInput::is_device_open("synthetic-input-exclusive"));
    assert!(matches!(
      SyntheticInput::open(config.clone()),
      Err(InputError::DeviceBusy(_))
    ));

    drop(first);
    assert!(!SyntheticInput::is_device_open("synthetic-input-exclusive"));
    let _second = SyntheticInput::open(config)?;
    Ok(())
  }

  #[test]
  fn stops_after_frame_limit() -> Result<(), InputError> {
    let config = SyntheticConfig::new("synthetic-input-limit")
      .with_size(8, 4)
      .with_fps(Some(10.0))
      .with_frames(Some(2));
    let mut input = SyntheticInput::open(config)?;
    let cancel = CancelToken::never();

    let first = input.next_frame(&cancel)?.expect("frame");
    let second = input.next_frame(&cancel)?.expect("frame");
    assert_eq!((first.index(), second.index()), (0, 1));
    assert_eq!(second.timestamp_ms(), 100);
    assert_eq!(second.size(), FrameSize::new(8, 4));
    assert!(input.next_frame(&cancel)?.is_none());
    Ok(())
  }
}
