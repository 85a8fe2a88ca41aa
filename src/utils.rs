// 该文件是 Fenlei （分类） 项目的一部分。
// src/utils.rs - 文件路径与格式工具
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

use chrono::{DateTime, Local};

pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff"];
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

const SAVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

fn extension_of(path: &Path) -> Option<String> {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| ext.to_lowercase())
}

pub fn is_image_file(path: &Path) -> bool {
  extension_of(path)
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    .unwrap_or(false)
}

pub fn is_video_file(path: &Path) -> bool {
  extension_of(path)
    .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
    .unwrap_or(false)
}

/// 列出目录下的全部图片文件，按路径排序
pub fn images_in_directory(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
  let mut images = Vec::new();
  for entry in std::fs::read_dir(directory)? {
    let path = entry?.path();
    if path.is_file() && is_image_file(&path) {
      images.push(path);
    }
  }
  images.sort();
  Ok(images)
}

/// 生成检测结果保存路径: `<save_dir>/<prefix>_<stem>_<时间戳>.<ext>`
pub fn timestamped_save_path(
  save_dir: &Path,
  original: &Path,
  prefix: &str,
  now: DateTime<Local>,
) -> PathBuf {
  let stem = original
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("frame");
  let timestamp = now.format(SAVE_TIMESTAMP_FORMAT);
  let name = match original.extension().and_then(|e| e.to_str()) {
    Some(ext) => format!("{}_{}_{}.{}", prefix, stem, timestamp, ext),
    None => format!("{}_{}_{}", prefix, stem, timestamp),
  };
  save_dir.join(name)
}

/// 生成录像保存路径，摄像头没有原始文件名时使用 `camera_record_<时间戳>.mp4`
pub fn video_save_path(save_dir: &Path, original: Option<&Path>, now: DateTime<Local>) -> PathBuf {
  let timestamp = now.format(SAVE_TIMESTAMP_FORMAT);
  let name = match original.and_then(|p| p.file_stem()).and_then(|s| s.to_str()) {
    Some(stem) => format!("detected_{}_{}.mp4", stem, timestamp),
    None => format!("camera_record_{}.mp4", timestamp),
  };
  save_dir.join(name)
}

pub fn format_size(size: u64) -> String {
  let mut value = size as f64;
  for unit in ["B", "KB", "MB", "GB"] {
    if value < 1024.0 {
      return format!("{:.2} {}", value, unit);
    }
    value /= 1024.0;
  }
  format!("{:.2} TB", value)
}
