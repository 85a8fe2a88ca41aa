// 该文件是 Fenlei （分类） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::{
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{Frame, FrameSize},
  pipeline::CancelToken,
  utils::{is_image_file, is_video_file},
};

mod directory_input;
mod read_image_file;
mod synthetic_input;

pub use self::directory_input::DirectoryInput;
pub use self::read_image_file::{ImageFileInput, load_frame};
pub use self::synthetic_input::{SyntheticConfig, SyntheticInput};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError};

const VIDEO_SCHEME: &str = "video";
const CAMERA_SCHEME: &str = "camera";
const CAMERA_DEVICE_PREFIX: &str = "/dev/video";

/// 输入源无法打开或读取
#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入源不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码失败: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("目录中没有可识别的图片: {0}")]
  EmptyDirectory(PathBuf),
  #[error("设备正被占用: {0}")]
  DeviceBusy(String),
  #[error("不支持的输入源: {0}")]
  Unsupported(String),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("URL 解析失败: {0}")]
  UrlError(#[from] url::ParseError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  Image,
  Directory,
  Video,
  Camera,
  Synthetic,
}

impl SourceKind {
  /// 视频、摄像头等连续输入需要后台线程驱动
  pub fn is_continuous(&self) -> bool {
    matches!(
      self,
      SourceKind::Video | SourceKind::Camera | SourceKind::Synthetic
    )
  }
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SourceKind::Image => "图片",
      SourceKind::Directory => "文件夹",
      SourceKind::Video => "视频",
      SourceKind::Camera => "摄像头",
      SourceKind::Synthetic => "模拟设备",
    };
    f.write_str(name)
  }
}

/// 帧输入源
///
/// 实现者在 `next_frame` 返回 `Ok(None)` 表示输入结束。阻塞读取的实现应周期性检查
/// `cancel`，在停止请求到达后尽快返回。
pub trait FrameSource {
  fn kind(&self) -> SourceKind;

  fn next_frame(&mut self, cancel: &CancelToken) -> Result<Option<Frame>, InputError>;

  /// 输入源标称帧率，未知时为 `None`
  fn fps(&self) -> Option<f64> {
    None
  }

  fn size(&self) -> Option<FrameSize>;
}

/// 输入源描述，只负责解析，不打开任何设备
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
  Image(PathBuf),
  Directory(PathBuf),
  Video(PathBuf),
  Camera(String),
  Synthetic(SyntheticConfig),
}

/// `0` 转换为 `/dev/video0`，其余原样返回
pub fn camera_device(id: &str) -> String {
  if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
    format!("{}{}", CAMERA_DEVICE_PREFIX, id)
  } else {
    id.to_string()
  }
}

impl SourceSpec {
  pub fn kind(&self) -> SourceKind {
    match self {
      SourceSpec::Image(_) => SourceKind::Image,
      SourceSpec::Directory(_) => SourceKind::Directory,
      SourceSpec::Video(_) => SourceKind::Video,
      SourceSpec::Camera(_) => SourceKind::Camera,
      SourceSpec::Synthetic(_) => SourceKind::Synthetic,
    }
  }

  /// 原始文件路径，摄像头与模拟设备没有
  pub fn path(&self) -> Option<&Path> {
    match self {
      SourceSpec::Image(path) | SourceSpec::Directory(path) | SourceSpec::Video(path) => {
        Some(path)
      }
      SourceSpec::Camera(_) | SourceSpec::Synthetic(_) => None,
    }
  }

  /// 打开输入源，失败即 `SourceUnavailable`
  pub fn open(&self) -> Result<Box<dyn FrameSource + Send>, InputError> {
    match self {
      SourceSpec::Image(path) => Ok(Box::new(ImageFileInput::open(path)?)),
      SourceSpec::Directory(path) => Ok(Box::new(DirectoryInput::open(path)?)),
      SourceSpec::Video(path) => open_video(path),
      SourceSpec::Camera(device) => open_camera(device),
      SourceSpec::Synthetic(config) => Ok(Box::new(SyntheticInput::open(config.clone())?)),
    }
  }
}

#[cfg(feature = "gstreamer_input")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource + Send>, InputError> {
  Ok(Box::new(GStreamerInput::open(path)?))
}

#[cfg(not(feature = "gstreamer_input"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource + Send>, InputError> {
  if !path.exists() {
    return Err(InputError::NotFound(path.to_path_buf()));
  }
  Err(InputError::Unsupported(format!(
    "{} (当前构建未启用 gstreamer_input 特性)",
    path.display()
  )))
}

#[cfg(feature = "v4l_input")]
fn open_camera(device: &str) -> Result<Box<dyn FrameSource + Send>, InputError> {
  Ok(Box::new(V4lInput::open(device)?))
}

#[cfg(not(feature = "v4l_input"))]
fn open_camera(device: &str) -> Result<Box<dyn FrameSource + Send>, InputError> {
  Err(InputError::Unsupported(format!(
    "{} (当前构建未启用 v4l_input 特性)",
    device
  )))
}

impl FromUrl for SourceSpec {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let scheme = url.scheme();
    if scheme == ImageFileInput::SCHEME {
      Ok(SourceSpec::Image(PathBuf::from(decoded_path(url))))
    } else if scheme == DirectoryInput::SCHEME {
      Ok(SourceSpec::Directory(PathBuf::from(decoded_path(url))))
    } else if scheme == VIDEO_SCHEME {
      Ok(SourceSpec::Video(PathBuf::from(decoded_path(url))))
    } else if scheme == CAMERA_SCHEME {
      Ok(SourceSpec::Camera(camera_device(&decoded_path(url))))
    } else if scheme == SyntheticInput::SCHEME {
      Ok(SourceSpec::Synthetic(SyntheticConfig::from_url(url)?))
    } else {
      Err(InputError::SchemeMismatch)
    }
  }
}

impl FromStr for SourceSpec {
  type Err = InputError;

  /// 接受 URL（`video:///data/a.mp4`）、摄像头编号（`0`）、设备路径或普通文件路径
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.contains("://") {
      return SourceSpec::from_url(&Url::parse(s)?);
    }

    let spec = camera_device(s);
    if spec.starts_with(CAMERA_DEVICE_PREFIX) {
      return Ok(SourceSpec::Camera(spec));
    }

    let path = PathBuf::from(s);
    if path.is_dir() {
      Ok(SourceSpec::Directory(path))
    } else if is_video_file(&path) {
      Ok(SourceSpec::Video(path))
    } else if is_image_file(&path) {
      Ok(SourceSpec::Image(path))
    } else {
      Err(InputError::Unsupported(s.to_string()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_urls() {
    let spec: SourceSpec = "image:///data/%E6%98%93%E6%8B%89%E7%BD%90.png".parse().unwrap();
    assert_eq!(spec, SourceSpec::Image(PathBuf::from("/data/易拉罐.png")));

    let spec: SourceSpec = "video:///data/clip.mp4".parse().unwrap();
    assert_eq!(spec.kind(), SourceKind::Video);
    assert!(spec.kind().is_continuous());

    let spec: SourceSpec = "camera://0".parse().unwrap();
    assert_eq!(spec, SourceSpec::Camera("/dev/video0".to_string()));

    assert!(matches!(
      "rtsp://camera/stream".parse::<SourceSpec>(),
      Err(InputError::SchemeMismatch)
    ));
  }

  #[test]
  fn sniffs_plain_paths() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let spec: SourceSpec = dir.path().to_string_lossy().parse()?;
    assert_eq!(spec, SourceSpec::Directory(dir.path().to_path_buf()));

    assert_eq!("a/b/clip.MKV".parse::<SourceSpec>()?.kind(), SourceKind::Video);
    assert_eq!("a/b/photo.jpeg".parse::<SourceSpec>()?.kind(), SourceKind::Image);
    assert_eq!("2".parse::<SourceSpec>()?, SourceSpec::Camera("/dev/video2".to_string()));
    assert!(matches!(
      "notes.docx".parse::<SourceSpec>(),
      Err(InputError::Unsupported(_))
    ));
    Ok(())
  }

  #[test]
  fn opening_missing_file_fails() {
    let spec = SourceSpec::Image(PathBuf::from("/nonexistent/photo.png"));
    assert!(matches!(spec.open(), Err(InputError::NotFound(_))));
    let spec = SourceSpec::Video(PathBuf::from("/nonexistent/clip.mp4"));
    assert!(spec.open().is_err());
  }
}
