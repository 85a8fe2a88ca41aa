// 该文件是 Fenlei （分类） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{Frame, FrameSize},
  input::{FrameSource, InputError, SourceKind},
  pipeline::CancelToken,
};

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 读取并解码一张图片，统一转换为 RGB
pub fn load_frame(path: &Path) -> Result<Frame, InputError> {
  if !path.is_file() {
    return Err(InputError::NotFound(path.to_path_buf()));
  }

  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  debug!(
    "读取图片 {} ({}x{})",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(Frame::from(image.to_rgb8()).with_origin(path))
}

/// 单张图片输入，只产生一帧
pub struct ImageFileInput {
  path: PathBuf,
  frame: Option<Frame>,
  size: FrameSize,
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, InputError> {
    let frame = load_frame(path)?;
    Ok(ImageFileInput {
      path: path.to_path_buf(),
      size: frame.size(),
      frame: Some(frame),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 取出图片帧，之后输入源即结束
  pub fn take_frame(&mut self) -> Option<Frame> {
    self.frame.take()
  }
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_IMAGE_FILE_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        READ_IMAGE_FILE_SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch);
    }
    ImageFileInput::open(Path::new(&decoded_path(url)))
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

impl FrameSource for ImageFileInput {
  fn kind(&self) -> SourceKind {
    SourceKind::Image
  }

  fn next_frame(&mut self, _cancel: &CancelToken) -> Result<Option<Frame>, InputError> {
    Ok(self.take_frame())
  }

  fn size(&self) -> Option<FrameSize> {
    Some(self.size)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn yields_single_frame_with_origin() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("电池.png");
    RgbImage::from_pixel(6, 4, Rgb([10, 20, 30])).save(&path)?;

    let url = Url::parse(&format!("image://{}", path.display()))?;
    let mut input = ImageFileInput::from_url(&url)?;
    assert_eq!(input.size(), Some(FrameSize::new(6, 4)));

    let cancel = CancelToken::never();
    let frame = input.next_frame(&cancel)?.ok_or("missing frame")?;
    assert_eq!(frame.origin(), Some(path.as_path()));
    assert_eq!(frame.image().get_pixel(0, 0), &Rgb([10, 20, 30]));
    assert!(input.next_frame(&cancel)?.is_none());
    Ok(())
  }

  #[test]
  fn rejects_other_schemes_and_bad_files() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse("video:///tmp/a.mp4")?;
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"not an image")?;
    assert!(matches!(
      ImageFileInput::open(&path),
      Err(InputError::ImageError(_))
    ));
    Ok(())
  }
}
