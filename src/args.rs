// 该文件是 Fenlei （分类） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fenlei::pipeline::Delivery;

/// Fenlei 垃圾分类检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径（TOML）
  #[arg(long, global = true, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 统计记录文件，覆盖配置中的 statistics_file
  #[arg(long, global = true, value_name = "FILE")]
  pub statistics: Option<PathBuf>,

  /// 类别表文件，覆盖配置中的 catalog_file
  #[arg(long, global = true, value_name = "FILE")]
  pub catalog: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 对图片、目录、视频或摄像头进行检测
  Detect(DetectArgs),
  /// 查看或导出检测统计
  Stats {
    #[command(subcommand)]
    action: StatsAction,
  },
}

#[derive(clap::Args, Debug)]
pub struct DetectArgs {
  /// 输入来源
  /// 支持格式:
  /// - 图片: *.jpg, *.png 或 image:///path/to/a.jpg
  /// - 目录: /path/to/dir 或 folder:///path/to/dir
  /// - 视频: *.mp4, *.avi 或 video:///path/to/a.mp4
  /// - 摄像头: 0, /dev/video0 或 camera://0
  /// - 合成画面: synthetic://demo?width=640&height=480&fps=30&frames=90
  #[arg(value_name = "SOURCE")]
  pub input: String,

  /// 保存标注后的单张检测结果
  #[arg(long)]
  pub save: bool,

  /// 录制连续输入的标注画面
  #[arg(long)]
  pub record: bool,

  /// 每隔多少帧记录一次统计
  #[arg(long, value_name = "FRAMES")]
  pub sample_interval: Option<u32>,

  /// 发布策略: latest 或 blocking
  #[arg(long, value_name = "POLICY")]
  pub delivery: Option<Delivery>,

  /// 最大处理帧数（仅对连续输入有效，0 表示无限制）
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_frames: u64,

  /// 不写入统计
  #[arg(long)]
  pub no_stats: bool,

  /// 标注文字所用字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum StatsAction {
  /// 今日统计
  Today,
  /// 全部记录的汇总
  Summary,
  /// 最近的检测记录
  Recent {
    #[arg(long, default_value_t = 10, value_name = "COUNT")]
    limit: usize,
  },
  /// 导出 CSV
  Export {
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
  },
  /// 清空全部记录
  Clear {
    /// 确认清空
    #[arg(long)]
    yes: bool,
  },
}
