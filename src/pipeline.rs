// 该文件是 Fenlei （分类） 项目的一部分。
// src/pipeline.rs - 实时检测流水线
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

//! # 检测流水线
//!
//! 图片在调用方线程上同步检测；文件夹由调用方逐张切换；视频、摄像头等连续输入
//! 由独立的检测线程驱动：采集 → 检测 → 录像（可选）→ 发布 → 按帧率等待。
//!
//! 检测线程通过容量为 1 的通道向调用方发布 [`PipelineEvent`]，发布永远不会无限堆积。
//! [`DetectionPipeline::stop`] 会等待检测线程退出，返回时输入设备与录像文件都已释放。

use std::{
  path::{Path, PathBuf},
  str::FromStr,
  sync::{Arc, Mutex, MutexGuard},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use crossbeam_channel::{
  Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError, bounded,
};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::{AppConfig, DEFAULT_FPS, is_usable_fps},
  frame::{Frame, FrameSize},
  input::{DirectoryInput, FrameSource, InputError, SourceKind, SourceSpec, load_frame},
  model::{DetectionSet, Detector, DetectorError, Inference},
  output::{OutputError, OutputWriter, RecorderFactory},
};

const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// 调用方来不及取走结果时的发布策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
  /// 新帧替换尚未取走的旧帧，结束/失败事件从不被替换
  #[default]
  Latest,
  /// 检测线程等待调用方取走上一帧
  Blocking,
}

impl FromStr for Delivery {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "latest" => Ok(Delivery::Latest),
      "blocking" => Ok(Delivery::Blocking),
      other => Err(format!("未知的发布策略: {}", other)),
    }
  }
}

/// 取消令牌，持有者全部释放 [`CancelHandle`] 后即视为已取消
#[derive(Debug, Clone)]
pub struct CancelToken {
  signal: Receiver<()>,
}

/// 取消令牌的触发端
#[derive(Debug)]
pub struct CancelHandle {
  _trigger: Sender<()>,
}

impl CancelHandle {
  pub fn cancel(self) {}
}

impl CancelToken {
  pub fn new() -> (CancelHandle, CancelToken) {
    let (trigger, signal) = bounded(0);
    (CancelHandle { _trigger: trigger }, CancelToken { signal })
  }

  /// 永不取消的令牌，供同步调用使用
  pub fn never() -> CancelToken {
    CancelToken {
      signal: crossbeam_channel::never(),
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
  }

  /// 可被取消打断的等待，返回 `true` 表示等待期间已取消
  pub fn sleep(&self, duration: Duration) -> bool {
    !matches!(
      self.signal.recv_timeout(duration),
      Err(RecvTimeoutError::Timeout)
    )
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入源不可用: {0}")]
  SourceUnavailable(#[from] InputError),
  #[error("检测失败: {0}")]
  DetectorFailure(#[from] DetectorError),
  #[error("无法启动检测线程: {0}")]
  ThreadSpawn(#[source] std::io::Error),
}

/// 发布给调用方的一帧检测结果
#[derive(Debug, Clone)]
pub struct Published {
  pub frame_index: u64,
  pub timestamp_ms: u64,
  pub origin: Option<PathBuf>,
  pub annotated: RgbImage,
  pub detections: DetectionSet,
}

impl Published {
  fn new(frame: &Frame, inference: Inference) -> Self {
    Published {
      frame_index: frame.index(),
      timestamp_ms: frame.timestamp_ms(),
      origin: frame.origin().map(Path::to_path_buf),
      annotated: inference.annotated,
      detections: inference.detections,
    }
  }
}

#[derive(Debug)]
pub enum PipelineEvent {
  Frame(Published),
  /// 录像失败只报告一次，检测继续
  RecordingFailed(String),
  /// 输入结束
  Finished,
  /// 本次运行因错误终止，流水线可重新启动
  Failed(PipelineError),
}

impl PipelineEvent {
  pub fn is_terminal(&self) -> bool {
    matches!(self, PipelineEvent::Finished | PipelineEvent::Failed(_))
  }
}

/// 连续输入的事件订阅，释放后检测线程随之结束
pub struct Subscription {
  events: Receiver<PipelineEvent>,
  _alive: Sender<()>,
  kind: SourceKind,
}

impl Subscription {
  pub fn kind(&self) -> SourceKind {
    self.kind
  }

  /// 检测线程退出且事件取尽后返回 `None`
  pub fn recv(&self) -> Option<PipelineEvent> {
    self.events.recv().ok()
  }

  pub fn recv_timeout(&self, timeout: Duration) -> Result<PipelineEvent, RecvTimeoutError> {
    self.events.recv_timeout(timeout)
  }

  pub fn try_recv(&self) -> Option<PipelineEvent> {
    self.events.try_recv().ok()
  }

  pub fn iter(&self) -> impl Iterator<Item = PipelineEvent> + '_ {
    self.events.iter()
  }
}

/// 文件夹浏览：调用方显式切换图片，每次切换同步检测一次
pub struct Gallery<D> {
  input: DirectoryInput,
  detector: Arc<Mutex<D>>,
}

impl<D: Detector> Gallery<D> {
  pub fn input(&self) -> &DirectoryInput {
    &self.input
  }

  pub fn len(&self) -> usize {
    self.input.len()
  }

  pub fn is_empty(&self) -> bool {
    self.input.is_empty()
  }

  pub fn position(&self) -> usize {
    self.input.position()
  }

  pub fn current(&self) -> Result<Published, PipelineError> {
    self.detect(self.input.current()?)
  }

  pub fn next_image(&mut self) -> Result<Published, PipelineError> {
    let frame = self.input.next_image()?;
    self.detect(frame)
  }

  pub fn prev_image(&mut self) -> Result<Published, PipelineError> {
    let frame = self.input.prev_image()?;
    self.detect(frame)
  }

  fn detect(&self, frame: Frame) -> Result<Published, PipelineError> {
    let frame = Frame::new(frame.into_image(), self.input.position() as u64, 0)
      .with_origin(self.input.current_path());
    let inference = lock_detector(&self.detector)?.detect(&frame)?;
    Ok(Published::new(&frame, inference))
  }
}

/// `start` 的结果，对应三种输入形态
pub enum Session<D> {
  Still(Published),
  Gallery(Gallery<D>),
  Stream(Subscription),
}

pub struct PipelineOptions {
  pub delivery: Delivery,
  /// 输入源不报告帧率时使用
  pub default_fps: f64,
  pub recorder: Option<Arc<dyn RecorderFactory>>,
}

impl Default for PipelineOptions {
  fn default() -> Self {
    PipelineOptions {
      delivery: Delivery::default(),
      default_fps: DEFAULT_FPS,
      recorder: None,
    }
  }
}

impl PipelineOptions {
  pub fn from_config(config: &AppConfig) -> Self {
    PipelineOptions {
      delivery: config.delivery,
      default_fps: config.default_fps,
      recorder: None,
    }
  }

  pub fn with_delivery(mut self, delivery: Delivery) -> Self {
    self.delivery = delivery;
    self
  }

  pub fn with_default_fps(mut self, fps: f64) -> Self {
    self.default_fps = fps;
    self
  }

  pub fn with_recorder(mut self, recorder: Option<Arc<dyn RecorderFactory>>) -> Self {
    self.recorder = recorder;
    self
  }
}

/// 输入源帧率不可用时退回默认帧率，两者都不可用时使用 `DEFAULT_FPS`
fn pacing_fps(source_fps: Option<f64>, default_fps: f64) -> f64 {
  match source_fps {
    Some(fps) if is_usable_fps(fps) => fps,
    Some(fps) => {
      warn!("输入源帧率 {} 不可用，改用默认帧率", fps);
      pacing_fps(None, default_fps)
    }
    None if is_usable_fps(default_fps) => default_fps,
    None => DEFAULT_FPS,
  }
}

fn lock_detector<D>(detector: &Mutex<D>) -> Result<MutexGuard<'_, D>, DetectorError> {
  detector
    .lock()
    .map_err(|e| DetectorError::Poisoned(e.to_string()))
}

struct Worker {
  handle: JoinHandle<()>,
  cancel: CancelHandle,
  kind: SourceKind,
}

pub struct DetectionPipeline<D> {
  detector: Arc<Mutex<D>>,
  options: PipelineOptions,
  worker: Option<Worker>,
}

impl<D: Detector + 'static> DetectionPipeline<D> {
  pub fn new(detector: D) -> Self {
    Self::with_options(detector, PipelineOptions::default())
  }

  pub fn with_options(detector: D, options: PipelineOptions) -> Self {
    DetectionPipeline {
      detector: Arc::new(Mutex::new(detector)),
      options,
      worker: None,
    }
  }

  pub fn options(&self) -> &PipelineOptions {
    &self.options
  }

  /// 在下一次 `start` 时生效
  pub fn set_recorder(&mut self, recorder: Option<Arc<dyn RecorderFactory>>) {
    self.options.recorder = recorder;
  }

  pub fn set_delivery(&mut self, delivery: Delivery) {
    self.options.delivery = delivery;
  }

  pub fn warm_up(&self) -> Result<(), PipelineError> {
    let now = Instant::now();
    lock_detector(&self.detector)?.warm_up()?;
    info!("模型预热完成，耗时: {:.2?}", now.elapsed());
    Ok(())
  }

  /// 同步检测一帧，不涉及后台线程与节流
  pub fn detect_once(&self, frame: &Frame) -> Result<Inference, PipelineError> {
    Ok(lock_detector(&self.detector)?.detect(frame)?)
  }

  pub fn is_running(&self) -> bool {
    self
      .worker
      .as_ref()
      .is_some_and(|worker| !worker.handle.is_finished())
  }

  /// 打开输入源并开始检测，已有运行中的检测会先被停止
  pub fn start(&mut self, spec: &SourceSpec) -> Result<Session<D>, PipelineError> {
    self.stop();
    info!("启动检测: {:?}", spec);

    match spec {
      SourceSpec::Image(path) => {
        let frame = load_frame(path)?;
        let inference = self.detect_once(&frame)?;
        info!("{}", inference.detections.summary_line());
        Ok(Session::Still(Published::new(&frame, inference)))
      }
      SourceSpec::Directory(path) => Ok(Session::Gallery(Gallery {
        input: DirectoryInput::open(path)?,
        detector: Arc::clone(&self.detector),
      })),
      _ => {
        let source = spec.open()?;
        Ok(Session::Stream(self.start_stream(source)?))
      }
    }
  }

  /// 在检测线程中驱动一个已打开的输入源
  pub fn start_stream(
    &mut self,
    source: Box<dyn FrameSource + Send>,
  ) -> Result<Subscription, PipelineError> {
    self.stop();

    let kind = source.kind();
    let (events_tx, events_rx) = bounded(1);
    let (alive_tx, alive_rx) = bounded::<()>(0);
    let (cancel_handle, cancel) = CancelToken::new();

    let publisher = Publisher {
      evictor: (self.options.delivery == Delivery::Latest).then(|| events_rx.clone()),
      events: events_tx,
      consumer: alive_rx,
      cancel: cancel.clone(),
    };
    let producer = Producer {
      source,
      detector: Arc::clone(&self.detector),
      publisher,
      recorder: self.options.recorder.clone(),
      default_fps: self.options.default_fps,
      cancel,
    };

    let handle = thread::Builder::new()
      .name("fenlei-detect".to_string())
      .spawn(move || producer.run())
      .map_err(PipelineError::ThreadSpawn)?;

    self.worker = Some(Worker {
      handle,
      cancel: cancel_handle,
      kind,
    });

    Ok(Subscription {
      events: events_rx,
      _alive: alive_tx,
      kind,
    })
  }

  /// 请求停止并等待检测线程退出，重复调用无副作用
  pub fn stop(&mut self) {
    let Some(worker) = self.worker.take() else {
      return;
    };

    worker.cancel.cancel();
    if worker.handle.join().is_err() {
      error!("检测线程异常退出");
    }
    info!("{}检测已停止", worker.kind);
  }
}

impl<D> Drop for DetectionPipeline<D> {
  fn drop(&mut self) {
    if let Some(worker) = self.worker.take() {
      worker.cancel.cancel();
      let _ = worker.handle.join();
    }
  }
}

struct Publisher {
  events: Sender<PipelineEvent>,
  evictor: Option<Receiver<PipelineEvent>>,
  consumer: Receiver<()>,
  cancel: CancelToken,
}

impl Publisher {
  fn consumer_gone(&self) -> bool {
    matches!(self.consumer.try_recv(), Err(TryRecvError::Disconnected))
  }

  /// 返回 `false` 表示调用方已不再接收
  fn publish(&self, event: PipelineEvent) -> bool {
    let Some(evictor) = &self.evictor else {
      return self.send_blocking(event);
    };
    if !matches!(event, PipelineEvent::Frame(_)) {
      return self.send_blocking(event);
    }
    if self.consumer_gone() {
      return false;
    }

    let mut event = event;
    loop {
      match self.events.try_send(event) {
        Ok(()) => return true,
        Err(TrySendError::Disconnected(_)) => return false,
        Err(TrySendError::Full(returned)) => {
          event = returned;
          match evictor.try_recv() {
            Ok(PipelineEvent::Frame(stale)) => {
              debug!("替换未取走的第 {} 帧", stale.frame_index);
            }
            Ok(other) => {
              // 非帧事件不能丢弃，放回后等待调用方取走
              if !self.send_blocking(other) {
                return false;
              }
              return self.send_blocking(event);
            }
            Err(_) => {}
          }
        }
      }
    }
  }

  fn send_blocking(&self, event: PipelineEvent) -> bool {
    let mut event = event;
    loop {
      match self.events.send_timeout(event, SEND_RETRY_INTERVAL) {
        Ok(()) => return true,
        Err(SendTimeoutError::Disconnected(_)) => return false,
        Err(SendTimeoutError::Timeout(returned)) => {
          if self.cancel.is_cancelled() || self.consumer_gone() {
            return false;
          }
          event = returned;
        }
      }
    }
  }
}

enum Outcome {
  Finished,
  Cancelled,
  Failed(PipelineError),
}

struct Producer<D> {
  source: Box<dyn FrameSource + Send>,
  detector: Arc<Mutex<D>>,
  publisher: Publisher,
  recorder: Option<Arc<dyn RecorderFactory>>,
  default_fps: f64,
  cancel: CancelToken,
}

impl<D: Detector> Producer<D> {
  fn run(self) {
    let Producer {
      mut source,
      detector,
      publisher,
      recorder,
      default_fps,
      cancel,
    } = self;

    let fps = pacing_fps(source.fps(), default_fps);
    let interval = Duration::from_secs_f64(1.0 / fps);
    info!("{}检测线程启动，帧间隔 {:.2?}", source.kind(), interval);

    let mut writer: Option<Box<dyn OutputWriter + Send>> = None;
    let mut recording = recorder.is_some();
    let mut published = 0u64;

    let outcome = loop {
      if cancel.is_cancelled() {
        break Outcome::Cancelled;
      }

      let started = Instant::now();
      let frame = match source.next_frame(&cancel) {
        Ok(Some(frame)) => frame,
        Ok(None) if cancel.is_cancelled() => break Outcome::Cancelled,
        Ok(None) => break Outcome::Finished,
        Err(e) => break Outcome::Failed(e.into()),
      };

      // 取消请求不会打断正在进行的推理
      let inference = match lock_detector(&detector).and_then(|mut d| d.detect(&frame)) {
        Ok(inference) => inference,
        Err(e) => break Outcome::Failed(e.into()),
      };

      if recording
        && let Some(factory) = &recorder
        && let Err(e) = record_frame(&mut writer, factory.as_ref(), &inference.annotated, fps)
      {
        error!("录像失败 ({}): {}", factory.describe(), e);
        writer = None;
        recording = false;
        if !publisher.publish(PipelineEvent::RecordingFailed(e.to_string())) {
          break Outcome::Cancelled;
        }
      }

      if !publisher.publish(PipelineEvent::Frame(Published::new(&frame, inference))) {
        break Outcome::Cancelled;
      }
      published += 1;

      let elapsed = started.elapsed();
      if elapsed < interval && cancel.sleep(interval - elapsed) {
        break Outcome::Cancelled;
      }
    };

    if let Some(mut writer) = writer
      && let Err(e) = writer.finish()
    {
      warn!("关闭录像失败: {}", e);
    }
    drop(source);
    info!("检测线程退出，共发布 {} 帧", published);

    match outcome {
      Outcome::Finished => {
        publisher.publish(PipelineEvent::Finished);
      }
      Outcome::Failed(e) => {
        error!("检测终止: {}", e);
        publisher.publish(PipelineEvent::Failed(e));
      }
      Outcome::Cancelled => {}
    }
  }
}

fn record_frame(
  writer: &mut Option<Box<dyn OutputWriter + Send>>,
  factory: &dyn RecorderFactory,
  image: &RgbImage,
  fps: f64,
) -> Result<(), OutputError> {
  if writer.is_none() {
    let size = FrameSize::new(image.width(), image.height());
    info!("开始录像: {}", factory.describe());
    *writer = Some(factory.open(size, fps)?);
  }
  match writer.as_mut() {
    Some(writer) => writer.write_frame(image),
    None => Ok(()),
  }
}
