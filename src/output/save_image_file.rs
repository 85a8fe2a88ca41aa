// 该文件是 Fenlei （分类） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use chrono::Local;
use image::RgbImage;
use tracing::info;

use crate::{output::OutputError, utils::timestamped_save_path};

const SAVE_PREFIX: &str = "detected";
const DEFAULT_NAME: &str = "detected_result.jpg";

/// 把标注后的单张检测结果保存到目录，文件名带时间戳避免覆盖
pub struct SaveImageFileOutput {
  directory: PathBuf,
}

impl SaveImageFileOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    SaveImageFileOutput {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// `original` 为原始图片路径，摄像头/视频帧没有原始文件时传 `None`
  pub fn save(&self, image: &RgbImage, original: Option<&Path>) -> Result<PathBuf, OutputError> {
    std::fs::create_dir_all(&self.directory)?;

    let original = original
      .filter(|p| p.extension().is_some())
      .unwrap_or(Path::new(DEFAULT_NAME));
    let path = timestamped_save_path(&self.directory, original, SAVE_PREFIX, Local::now());

    image.save(&path)?;
    info!("保存检测结果到文件: {}", path.display());

    Ok(path)
  }
}
