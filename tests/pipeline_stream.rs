// 该文件是 Fenlei （分类） 项目的一部分。
// tests/pipeline_stream.rs - 检测流水线集成测试
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

use std::{sync::Arc, time::Duration};

use anyhow::{Result, bail};
use image::{Rgb, RgbImage};

use fenlei::{
  catalog::{BuiltinCatalog, ClassCatalog},
  input::{InputError, SourceSpec, SyntheticInput},
  model::{AnnotatingDetector, RawDetection, ReplayModel},
  pipeline::{
    Delivery, DetectionPipeline, PipelineError, PipelineEvent, PipelineOptions, Session,
    Subscription,
  },
  stats::{FrameSampler, SharedStatistics, StatisticsAggregator},
};

type Pipeline = DetectionPipeline<AnnotatingDetector<ReplayModel>>;

fn pipeline(delivery: Delivery) -> Result<(Pipeline, Arc<ClassCatalog>)> {
  let catalog = Arc::new(ClassCatalog::builtin(BuiltinCatalog::Basic)?);
  let model = ReplayModel::new().with_fallback(vec![RawDetection {
    class_id: 2,
    score: 0.91,
    bbox: [1.0, 1.0, 12.0, 12.0],
  }]);
  let detector = AnnotatingDetector::new(model, Arc::clone(&catalog));
  let options = PipelineOptions::default().with_delivery(delivery);
  Ok((DetectionPipeline::with_options(detector, options), catalog))
}

fn subscription(session: Session<AnnotatingDetector<ReplayModel>>) -> Result<Subscription> {
  match session {
    Session::Stream(subscription) => Ok(subscription),
    _ => bail!("expected a stream session"),
  }
}

#[test]
fn sampled_stream_frames_feed_statistics() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let (mut pipeline, catalog) = pipeline(Delivery::Blocking)?;
  let stats = SharedStatistics::new(StatisticsAggregator::open(
    dir.path().join("statistics.json"),
    Arc::clone(&catalog),
  ));

  let spec: SourceSpec = "synthetic://it-sampled?width=32&height=24&fps=200&frames=10".parse()?;
  let events = subscription(pipeline.start(&spec)?)?;

  let mut sampler = FrameSampler::new(3);
  let mut frames = 0;
  while let Some(event) = events.recv() {
    match event {
      PipelineEvent::Frame(published) => {
        frames += 1;
        assert_eq!(published.annotated.dimensions(), (32, 24));
        let index = published.frame_index;
        if let Some(detections) = sampler.sample(index, &published.detections) {
          stats.record(detections);
        }
      }
      PipelineEvent::Finished => break,
      PipelineEvent::Failed(e) => return Err(e.into()),
      PipelineEvent::RecordingFailed(_) => {}
    }
  }
  pipeline.stop();

  assert_eq!(frames, 10);
  let snapshot = stats.snapshot();
  assert_eq!(snapshot.total_detections, 3);
  assert_eq!(snapshot.category_totals.get("可回收物"), Some(&3));

  let reloaded = StatisticsAggregator::open(dir.path().join("statistics.json"), catalog);
  let ids: Vec<u64> = reloaded.records().iter().map(|r| r.id).collect();
  assert_eq!(ids, vec![1, 2, 3]);
  assert_eq!(reloaded.records()[0].items[0].name, "易拉罐");
  Ok(())
}

#[test]
fn missing_image_is_source_unavailable() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let (mut pipeline, _) = pipeline(Delivery::Latest)?;
  let spec = SourceSpec::Image(dir.path().join("missing.jpg"));

  match pipeline.start(&spec) {
    Err(PipelineError::SourceUnavailable(InputError::NotFound(path))) => {
      assert_eq!(path, dir.path().join("missing.jpg"));
    }
    Err(e) => bail!("unexpected error: {}", e),
    Ok(_) => bail!("missing image must not start"),
  }
  assert!(!pipeline.is_running());
  Ok(())
}

#[test]
fn missing_video_is_source_unavailable() -> Result<()> {
  let dir = tempfile::tempdir()?;
  let (mut pipeline, _) = pipeline(Delivery::Latest)?;
  let spec = SourceSpec::Video(dir.path().join("missing.mp4"));

  assert!(matches!(
    pipeline.start(&spec),
    Err(PipelineError::SourceUnavailable(_))
  ));
  assert!(!pipeline.is_running());
  Ok(())
}

#[test]
fn busy_device_fails_without_holding_anything() -> Result<()> {
  let (mut first, _) = pipeline(Delivery::Latest)?;
  let (mut second, _) = pipeline(Delivery::Latest)?;
  let spec: SourceSpec = "synthetic://it-busy?width=16&height=16&fps=50".parse()?;

  let _events = subscription(first.start(&spec)?)?;
  assert!(matches!(
    second.start(&spec),
    Err(PipelineError::SourceUnavailable(InputError::DeviceBusy(_)))
  ));
  assert!(!second.is_running());

  first.stop();
  assert!(!SyntheticInput::is_device_open("it-busy"));
  let _events = subscription(second.start(&spec)?)?;
  assert!(second.is_running());
  second.stop();
  Ok(())
}

#[test]
fn stop_then_start_on_same_device() -> Result<()> {
  let (mut pipeline, _) = pipeline(Delivery::Latest)?;
  let spec: SourceSpec = "synthetic://it-restart?width=16&height=16&fps=100".parse()?;

  for _ in 0..3 {
    let events = subscription(pipeline.start(&spec)?)?;
    assert!(matches!(
      events.recv_timeout(Duration::from_secs(5)),
      Ok(PipelineEvent::Frame(_))
    ));
    pipeline.stop();
    assert!(!pipeline.is_running());
    assert!(!SyntheticInput::is_device_open("it-restart"));
  }
  Ok(())
}

#[test]
fn directory_session_walks_sorted_images() -> Result<()> {
  let dir = tempfile::tempdir()?;
  for name in ["b.png", "a.png", "c.png"] {
    RgbImage::from_pixel(16, 16, Rgb([200, 200, 200])).save(dir.path().join(name))?;
  }
  let (mut pipeline, _) = pipeline(Delivery::Latest)?;

  let Session::Gallery(mut gallery) = pipeline.start(&SourceSpec::Directory(dir.path().into()))?
  else {
    bail!("expected a gallery session");
  };
  assert_eq!(gallery.len(), 3);

  let first = gallery.current()?;
  assert_eq!(first.origin.as_deref(), Some(dir.path().join("a.png").as_path()));
  assert_eq!(first.detections.len(), 1);

  let wrapped = gallery.prev_image()?;
  assert_eq!(wrapped.origin.as_deref(), Some(dir.path().join("c.png").as_path()));
  let back = gallery.next_image()?;
  assert_eq!(back.origin.as_deref(), Some(dir.path().join("a.png").as_path()));
  Ok(())
}
