// 该文件是 Fenlei （分类） 项目的一部分。
// src/input/directory_input.rs - 图片文件夹输入
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

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{Frame, FrameSize},
  input::{FrameSource, InputError, SourceKind, load_frame},
  pipeline::CancelToken,
  utils::images_in_directory,
};

const FOLDER_SCHEME: &str = "folder";

/// 文件夹中的图片按文件名排序，由调用方显式切换上一张/下一张，首尾循环
#[derive(Debug, Clone)]
pub struct DirectoryInput {
  directory: PathBuf,
  paths: Vec<PathBuf>,
  position: usize,
  streamed: usize,
}

impl DirectoryInput {
  pub fn open(directory: &Path) -> Result<Self, InputError> {
    if !directory.is_dir() {
      return Err(InputError::NotFound(directory.to_path_buf()));
    }

    let paths = images_in_directory(directory)?;
    if paths.is_empty() {
      return Err(InputError::EmptyDirectory(directory.to_path_buf()));
    }
    info!("文件夹 {} 中共 {} 张图片", directory.display(), paths.len());

    Ok(DirectoryInput {
      directory: directory.to_path_buf(),
      paths,
      position: 0,
      streamed: 0,
    })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn paths(&self) -> &[PathBuf] {
    &self.paths
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn position(&self) -> usize {
    self.position
  }

  pub fn current_path(&self) -> &Path {
    &self.paths[self.position]
  }

  pub fn current(&self) -> Result<Frame, InputError> {
    load_frame(self.current_path())
  }

  pub fn next_image(&mut self) -> Result<Frame, InputError> {
    self.position = (self.position + 1) % self.paths.len();
    self.current()
  }

  pub fn prev_image(&mut self) -> Result<Frame, InputError> {
    self.position = (self.position + self.paths.len() - 1) % self.paths.len();
    self.current()
  }
}

impl FromUrl for DirectoryInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != FOLDER_SCHEME {
      return Err(InputError::SchemeMismatch);
    }
    DirectoryInput::open(Path::new(&decoded_path(url)))
  }
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = FOLDER_SCHEME;
}

/// 作为帧流时按顺序遍历一遍，不循环
impl FrameSource for DirectoryInput {
  fn kind(&self) -> SourceKind {
    SourceKind::Directory
  }

  fn next_frame(&mut self, _cancel: &CancelToken) -> Result<Option<Frame>, InputError> {
    let Some(path) = self.paths.get(self.streamed) else {
      return Ok(None);
    };
    let frame = load_frame(path)?;
    let index = self.streamed as u64;
    self.streamed += 1;
    let origin = path.clone();
    Ok(Some(Frame::new(frame.into_image(), index, 0).with_origin(origin)))
  }

  fn size(&self) -> Option<FrameSize> {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn gallery() -> Result<(tempfile::TempDir, DirectoryInput), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    for name in ["b.png", "a.png", "c.jpg"] {
      RgbImage::new(4, 4).save(dir.path().join(name))?;
    }
    std::fs::write(dir.path().join("readme.txt"), "skip")?;
    let input = DirectoryInput::open(dir.path())?;
    Ok((dir, input))
  }

  fn name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
  }

  #[test]
  fn navigation_wraps_both_ways() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut input) = gallery()?;
    assert_eq!(input.len(), 3);
    assert_eq!(name(input.current_path()), "a.png");

    input.prev_image()?;
    assert_eq!(name(input.current_path()), "c.jpg");
    input.next_image()?;
    assert_eq!(name(input.current_path()), "a.png");
    let frame = input.next_image()?;
    assert_eq!(frame.origin().map(name), Some("b.png"));
    Ok(())
  }

  #[test]
  fn streams_each_image_once() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut input) = gallery()?;
    let cancel = CancelToken::never();
    let mut indices = Vec::new();
    while let Some(frame) = input.next_frame(&cancel)? {
      indices.push(frame.index());
    }
    assert_eq!(indices, vec![0, 1, 2]);
    Ok(())
  }

  #[test]
  fn empty_or_missing_directory_is_unavailable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    assert!(matches!(
      DirectoryInput::open(dir.path()),
      Err(InputError::EmptyDirectory(_))
    ));
    assert!(matches!(
      DirectoryInput::open(&dir.path().join("missing")),
      Err(InputError::NotFound(_))
    ));
    Ok(())
  }
}
