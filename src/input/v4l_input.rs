// 该文件是 Fenlei （分类） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头输入
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

use std::{io::ErrorKind, path::PathBuf, time::Instant};

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use v4l::{
  Device, FourCC, buffer::Type, io::traits::CaptureStream, prelude::MmapStream, video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{Frame, FrameSize},
  input::{FrameSource, InputError, SourceKind, camera_device},
  pipeline::CancelToken,
};

const V4L_SCHEME: &str = "camera";
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("V4L error: {0}")]
  V4lError(String),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Captured buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// V4L2 摄像头，独占设备直到析构
pub struct V4lInput {
  device_path: String,
  stream: MmapStream<'static>,
  fourcc: FourCC,
  size: FrameSize,
  fps: Option<f64>,
  frame_index: u64,
  started: Instant,
}

fn open_error(device_path: &str, err: std::io::Error) -> InputError {
  match err.kind() {
    ErrorKind::NotFound => InputError::NotFound(PathBuf::from(device_path)),
    ErrorKind::ResourceBusy => InputError::DeviceBusy(device_path.to_string()),
    _ => InputError::V4lInputError(V4lInputError::V4lError(format!("{}: {}", device_path, err))),
  }
}

impl V4lInput {
  pub fn open(device: &str) -> Result<Self, InputError> {
    let device_path = camera_device(device);
    let device = Device::with_path(&device_path).map_err(|e| open_error(&device_path, e))?;

    // 优先请求 RGB3，驱动不支持时沿用当前格式
    let mut format = device.format().map_err(|e| open_error(&device_path, e))?;
    format.fourcc = FourCC::new(b"RGB3");
    let format = match device.set_format(&format) {
      Ok(format) => format,
      Err(e) => {
        warn!("设置 {} 像素格式失败: {}", device_path, e);
        device.format().map_err(|e| open_error(&device_path, e))?
      }
    };

    let fps = device.params().ok().and_then(|params| {
      let interval = params.interval;
      (interval.numerator > 0 && interval.denominator > 0)
        .then(|| interval.denominator as f64 / interval.numerator as f64)
    });

    let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
      .map_err(|e| open_error(&device_path, e))?;

    info!(
      "打开摄像头 {} ({}x{}, {}, {:?} fps)",
      device_path, format.width, format.height, format.fourcc, fps
    );

    Ok(V4lInput {
      device_path,
      stream,
      fourcc: format.fourcc,
      size: FrameSize::new(format.width, format.height),
      fps,
      frame_index: 0,
      started: Instant::now(),
    })
  }

  pub fn device_path(&self) -> &str {
    &self.device_path
  }

  fn decode(&self, data: &[u8]) -> Result<RgbImage, InputError> {
    let FrameSize { width, height } = self.size;
    let pixels = (width * height) as usize;

    match &self.fourcc.repr {
      b"RGB3" => {
        let expected = pixels * 3;
        if data.len() < expected {
          return Err(V4lInputError::BufferSizeMismatch {
            expected,
            actual: data.len(),
          }
          .into());
        }
        RgbImage::from_raw(width, height, data[..expected].to_vec()).ok_or_else(|| {
          V4lInputError::BufferSizeMismatch {
            expected,
            actual: data.len(),
          }
          .into()
        })
      }
      b"YUYV" => {
        let expected = pixels * 2;
        if data.len() < expected {
          return Err(V4lInputError::BufferSizeMismatch {
            expected,
            actual: data.len(),
          }
          .into());
        }
        Ok(yuyv_to_rgb(&data[..expected], width, height))
      }
      b"MJPG" => {
        let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
        Ok(image.to_rgb8())
      }
      _ => Err(V4lInputError::UnsupportedPixelFormat(self.fourcc.to_string()).into()),
    }
  }
}

fn clamp_channel(value: i32) -> u8 {
  value.clamp(0, 255) as u8
}

/// YUYV 4:2:2 转 RGB（BT.601）
fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> RgbImage {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);
  for chunk in data.chunks_exact(4) {
    let (y0, u, y1, v) = (
      chunk[0] as i32,
      chunk[1] as i32 - 128,
      chunk[2] as i32,
      chunk[3] as i32 - 128,
    );
    for y in [y0, y1] {
      let c = y - 16;
      rgb.push(clamp_channel((298 * c + 409 * v + 128) >> 8));
      rgb.push(clamp_channel((298 * c - 100 * u - 208 * v + 128) >> 8));
      rgb.push(clamp_channel((298 * c + 516 * u + 128) >> 8));
    }
  }
  RgbImage::from_raw(width, height, rgb).unwrap_or_else(|| RgbImage::new(width, height))
}

impl FromUrl for V4lInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != V4L_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        V4L_SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch);
    }
    V4lInput::open(&decoded_path(url))
  }
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = V4L_SCHEME;
}

impl FrameSource for V4lInput {
  fn kind(&self) -> SourceKind {
    SourceKind::Camera
  }

  fn next_frame(&mut self, cancel: &CancelToken) -> Result<Option<Frame>, InputError> {
    if cancel.is_cancelled() {
      return Ok(None);
    }

    let (buffer, _meta) = self.stream.next().map_err(|e| {
      InputError::V4lInputError(V4lInputError::V4lError(format!(
        "{}: {}",
        self.device_path, e
      )))
    })?;
    let data = buffer.to_vec();

    let image = self.decode(&data)?;
    let index = self.frame_index;
    self.frame_index += 1;
    let timestamp_ms = self.started.elapsed().as_millis() as u64;
    Ok(Some(Frame::new(image, index, timestamp_ms)))
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }

  fn size(&self) -> Option<FrameSize> {
    Some(self.size)
  }
}

impl Drop for V4lInput {
  fn drop(&mut self) {
    info!("释放摄像头 {}", self.device_path);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn converts_gray_yuyv() {
    // Y=235 为白色，Y=16 为黑色，U/V 居中无色度
    let data = [235, 128, 16, 128];
    let image = yuyv_to_rgb(&data, 2, 1);
    assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255]);
    assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0]);
  }

  #[test]
  fn missing_device_is_not_found() {
    assert!(matches!(
      V4lInput::open("/dev/video-does-not-exist"),
      Err(InputError::NotFound(_))
    ));
  }
}
