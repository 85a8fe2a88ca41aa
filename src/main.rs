// 该文件是 Fenlei （分类） 项目的一部分。
// src/main.rs - 命令行主程序
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

mod args;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{Result, bail};
use chrono::Local;
use clap::Parser;
use crossbeam_channel::{RecvTimeoutError, bounded};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fenlei::{
  catalog::ClassCatalog,
  config::AppConfig,
  input::SourceSpec,
  model::{AnnotatingDetector, ReplayModel},
  output::{Annotator, SaveImageFileOutput, VideoFileRecorder},
  pipeline::{DetectionPipeline, PipelineEvent, PipelineOptions, Published, Session},
  stats::{FrameSampler, SharedStatistics, StatisticsAggregator, StatisticsSnapshot},
  utils::{format_size, video_save_path},
};

use args::{Args, Command, DetectArgs, StatsAction};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  let mut config = match &args.config {
    Some(path) => AppConfig::load(path)?,
    None => AppConfig::default(),
  };
  if let Some(path) = &args.statistics {
    config.statistics_file = Some(path.clone());
  }
  if let Some(path) = &args.catalog {
    config.catalog_file = Some(path.clone());
  }

  match args.command {
    Command::Detect(detect) => run_detect(config, detect),
    Command::Stats { action } => run_stats(config, action),
  }
}

fn run_detect(mut config: AppConfig, args: DetectArgs) -> Result<()> {
  if let Some(interval) = args.sample_interval {
    config.sample_interval = interval;
  }
  if let Some(delivery) = args.delivery {
    config.delivery = delivery;
  }
  if args.font.is_some() {
    config.font = args.font.clone();
  }
  if args.record {
    config.record_video = true;
  }
  config.validate()?;

  let catalog = Arc::new(config.load_catalog()?);
  info!("类别表 {}，共 {} 个类别", catalog.version(), catalog.len());

  let annotator = match &config.font {
    Some(path) => Annotator::with_font_file(path)?,
    None => Annotator::default(),
  };
  let detector =
    AnnotatingDetector::new(ReplayModel::new(), Arc::clone(&catalog)).with_annotator(annotator);
  let stats = (!args.no_stats).then(|| {
    SharedStatistics::new(StatisticsAggregator::from_config(&config, Arc::clone(&catalog)))
  });

  let mut pipeline = DetectionPipeline::with_options(detector, PipelineOptions::from_config(&config));
  pipeline.warm_up()?;

  let spec: SourceSpec = args.input.parse()?;
  if spec.kind().is_continuous() && config.record_video {
    let path = video_save_path(&config.save_dir, spec.path(), Local::now());
    info!("录像保存到: {}", path.display());
    pipeline.set_recorder(Some(Arc::new(VideoFileRecorder::new(path))));
  }

  let saver = args.save.then(|| SaveImageFileOutput::new(&config.save_dir));

  match pipeline.start(&spec)? {
    Session::Still(published) => {
      report(&published, &catalog, stats.as_ref(), saver.as_ref());
    }
    Session::Gallery(mut gallery) => {
      info!("目录中共有 {} 张图片", gallery.len());
      for step in 0..gallery.len() {
        let published = if step == 0 {
          gallery.current()?
        } else {
          gallery.next_image()?
        };
        report(&published, &catalog, stats.as_ref(), saver.as_ref());
      }
    }
    Session::Stream(subscription) => {
      let (interrupt_tx, interrupt_rx) = bounded::<()>(1);
      ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
      })?;

      let mut sampler = FrameSampler::new(config.sample_interval);
      let mut frames = 0u64;
      loop {
        if interrupt_rx.try_recv().is_ok() {
          warn!("收到中断信号，停止检测");
          break;
        }
        let event = match subscription.recv_timeout(POLL_INTERVAL) {
          Ok(event) => event,
          Err(RecvTimeoutError::Timeout) => continue,
          Err(RecvTimeoutError::Disconnected) => break,
        };
        match event {
          PipelineEvent::Frame(published) => {
            frames += 1;
            info!(
              "帧 {} ({}ms): {}",
              published.frame_index,
              published.timestamp_ms,
              published.detections.summary_line()
            );
            if let Some(stats) = &stats
              && let Some(detections) =
                sampler.sample(published.frame_index, &published.detections)
              && let Some(recorded) = stats.record(detections)
              && let Err(e) = recorded.persistence
            {
              error!("统计写入失败: {}", e);
            }
            if args.max_frames > 0 && frames >= args.max_frames {
              warn!("已达到最大帧数限制: {}", args.max_frames);
              break;
            }
          }
          PipelineEvent::RecordingFailed(reason) => warn!("录像失败: {}", reason),
          PipelineEvent::Finished => {
            info!("输入结束，共处理 {} 帧", frames);
            break;
          }
          PipelineEvent::Failed(e) => {
            pipeline.stop();
            bail!("检测失败: {}", e);
          }
        }
      }
      pipeline.stop();
    }
  }

  if let Some(stats) = &stats {
    print_snapshot(&stats.snapshot());
  }
  Ok(())
}

fn report(
  published: &Published,
  catalog: &ClassCatalog,
  stats: Option<&SharedStatistics>,
  saver: Option<&SaveImageFileOutput>,
) {
  let source = published
    .origin
    .as_ref()
    .map(|p| p.display().to_string())
    .unwrap_or_default();
  println!("{} {}", source, published.detections.summary_line());
  for line in published.detections.guidance(catalog) {
    println!("  {}", line);
  }

  if let Some(stats) = stats
    && let Some(recorded) = stats.record(&published.detections)
    && let Err(e) = recorded.persistence
  {
    error!("统计写入失败: {}", e);
  }

  if let Some(saver) = saver
    && let Err(e) = saver.save(&published.annotated, published.origin.as_deref())
  {
    error!("保存检测结果失败: {}", e);
  }
}

fn run_stats(config: AppConfig, action: StatsAction) -> Result<()> {
  let catalog = Arc::new(config.load_catalog()?);
  let mut aggregator = StatisticsAggregator::from_config(&config, catalog);

  match action {
    StatsAction::Today => {
      let today = aggregator.today_summary();
      println!("日期: {}", today.date);
      println!("检测次数: {}", today.detection_count);
      println!("检测物品: {}", today.total_items);
      print_table("分类统计", &today.category_breakdown);
    }
    StatsAction::Summary => {
      let summary = aggregator.total_summary();
      println!("检测次数: {}", summary.total_detections);
      println!("检测物品: {}", summary.total_items);
      print_table("分类统计", &summary.category_totals);
      print_table("类别统计", &summary.class_totals);
      print_table("每日统计", &aggregator.daily_totals());
    }
    StatsAction::Recent { limit } => {
      for record in aggregator.recent_records(limit) {
        println!(
          "#{} {} {} 数量: {} [{}] 耗时: {:.1}ms",
          record.id,
          record.date,
          record.time,
          record.item_count(),
          record.joined_names(),
          record.elapsed_ms
        );
      }
    }
    StatsAction::Export { output } => {
      let path = aggregator.export_csv(output.as_deref())?;
      let size = std::fs::metadata(&path)?.len();
      println!(
        "已导出 {} 条记录到: {} ({})",
        aggregator.len(),
        path.display(),
        format_size(size)
      );
    }
    StatsAction::Clear { yes } => {
      if !yes {
        bail!("清空统计需要 --yes 确认");
      }
      aggregator.clear()?;
      println!("已清空 {}", aggregator.path().display());
    }
  }
  Ok(())
}

fn print_snapshot(snapshot: &StatisticsSnapshot) {
  println!();
  println!(
    "今日检测 {} 次，共 {} 个物品；累计检测 {} 次",
    snapshot.today.detection_count, snapshot.today.total_items, snapshot.total_detections
  );
  print_table("累计分类统计", &snapshot.category_totals);
}

fn print_table(title: &str, table: &BTreeMap<String, usize>) {
  println!("{}:", title);
  if table.is_empty() {
    println!("  (无)");
  }
  for (name, count) in table {
    println!("  {}: {}", name, count);
  }
}
