//! Paced camera recording
//!
//! Frames are read at a fixed interval, transformed like stills and held in
//! a short window; the oldest frame goes to the encode sink whenever the
//! window fills. The loop ends once the target duration has elapsed or a
//! stop is requested, and the remaining window is flushed before the sink
//! closes.

use super::channel::{ChannelType, RecordingChannel, RecordingError, RecordingResult};
use super::sink::{open_with_retry, EncodeSink, SinkFactory, SinkSpec, SINK_OPEN_ATTEMPTS, SINK_OPEN_BACKOFF};
use crate::capture::{CameraDevice, DeviceLease, DeviceOwner};
use crate::pipeline::{Frame, FrameTransform};
use crate::utils::BoothError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Frames buffered ahead of the encoder
pub const FRAME_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub frames_written: u64,
    pub reads_missed: u64,
}

pub struct VideoChannel {
    id: String,
    device: Arc<CameraDevice>,
    sinks: Arc<dyn SinkFactory>,
    transform: FrameTransform,
    spec: SinkSpec,
    duration: Duration,
    sink_backoff: Duration,
    stop: Arc<AtomicBool>,
    is_recording: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<EncodeStats, BoothError>>>,
    output_files: Vec<PathBuf>,
}

impl VideoChannel {
    pub fn new(
        device: Arc<CameraDevice>,
        sinks: Arc<dyn SinkFactory>,
        transform: FrameTransform,
        path: PathBuf,
        frame_rate: u32,
        duration: Duration,
    ) -> Self {
        let spec = SinkSpec {
            path,
            width: transform.canvas.width,
            height: transform.canvas.height,
            frame_rate: frame_rate.max(1),
        };
        Self {
            id: "camera".to_string(),
            device,
            sinks,
            transform,
            spec,
            duration,
            sink_backoff: SINK_OPEN_BACKOFF,
            stop: Arc::new(AtomicBool::new(false)),
            is_recording: Arc::new(AtomicBool::new(false)),
            worker: None,
            output_files: Vec::new(),
        }
    }

    /// Override the pause between sink open attempts
    pub fn with_sink_backoff(mut self, backoff: Duration) -> Self {
        self.sink_backoff = backoff;
        self
    }
}

#[async_trait]
impl RecordingChannel for VideoChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Video
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.is_recording.load(Ordering::SeqCst) {
            return Err(RecordingError::AlreadyRecording);
        }

        let lease = self
            .device
            .acquire(DeviceOwner::Recorder)
            .map_err(|e| RecordingError::DeviceNotFound(e.to_string()))?;

        let sinks = self.sinks.clone();
        let spec = self.spec.clone();
        let backoff = self.sink_backoff;
        let sink = tokio::task::spawn_blocking(move || {
            open_with_retry(sinks.as_ref(), &spec, SINK_OPEN_ATTEMPTS, backoff)
        })
        .await
        .map_err(|e| RecordingError::EncodeSink(e.to_string()))?
        .map_err(|e| RecordingError::EncodeSink(e.to_string()))?;

        // The sink may create the file right away; it must be discarded
        // on every failure path from here on
        self.output_files = vec![self.spec.path.clone()];
        self.stop.store(false, Ordering::SeqCst);
        self.is_recording.store(true, Ordering::SeqCst);

        let job = EncodeLoop {
            lease: Some(lease),
            sink,
            transform: self.transform,
            interval: Duration::from_secs_f64(1.0 / self.spec.frame_rate as f64),
            duration: self.duration,
            stop: self.stop.clone(),
            is_recording: self.is_recording.clone(),
        };
        let handle = std::thread::Builder::new()
            .name("video-encode".to_string())
            .spawn(move || job.run())?;
        self.worker = Some(handle);

        tracing::info!(
            "Video recording started: {}x{} @ {}fps for {:?} -> {:?}",
            self.spec.width,
            self.spec.height,
            self.spec.frame_rate,
            self.duration,
            self.spec.path
        );
        Ok(())
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    async fn finish(&mut self) -> RecordingResult<()> {
        let Some(handle) = self.worker.take() else {
            return Err(RecordingError::NotRecording);
        };

        let stats = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| RecordingError::CaptureError(e.to_string()))?
            .map_err(|_| RecordingError::CaptureError("Encode thread panicked".to_string()))?
            .map_err(|e| RecordingError::EncodeSink(e.to_string()))?;

        tracing::info!(
            "Video recording finished: {} frames written, {} reads missed",
            stats.frames_written,
            stats.reads_missed
        );
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.output_files.clone()
    }
}

struct EncodeLoop {
    lease: Option<DeviceLease>,
    sink: Box<dyn EncodeSink>,
    transform: FrameTransform,
    interval: Duration,
    duration: Duration,
    stop: Arc<AtomicBool>,
    is_recording: Arc<AtomicBool>,
}

impl EncodeLoop {
    fn run(mut self) -> Result<EncodeStats, BoothError> {
        let mut window = FrameWindow::new(FRAME_WINDOW);
        let mut stats = EncodeStats::default();
        let captured = self.capture(&mut window, &mut stats);

        // Camera is free as soon as capture ends
        drop(self.lease.take());
        self.is_recording.store(false, Ordering::SeqCst);

        if let Err(e) = captured {
            let _ = self.sink.finish();
            return Err(e);
        }

        for frame in window.drain() {
            self.sink.write_frame(&frame)?;
            stats.frames_written += 1;
        }
        self.sink.finish()?;
        Ok(stats)
    }

    fn capture(&mut self, window: &mut FrameWindow, stats: &mut EncodeStats) -> Result<(), BoothError> {
        let Some(lease) = self.lease.as_mut() else {
            return Ok(());
        };
        let started = Instant::now();

        while !self.stop.load(Ordering::SeqCst) && started.elapsed() <= self.duration {
            let tick = Instant::now();
            match lease.read_frame() {
                Ok(raw) => {
                    if let Some(oldest) = window.push(self.transform.apply(raw)) {
                        self.sink.write_frame(&oldest)?;
                        stats.frames_written += 1;
                    }
                }
                Err(e) => {
                    stats.reads_missed += 1;
                    tracing::debug!("Recording read missed: {}", e);
                }
            }
            if let Some(rest) = self.interval.checked_sub(tick.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        Ok(())
    }
}

/// Short FIFO between camera reads and the encoder
#[derive(Debug)]
pub struct FrameWindow {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Buffer `frame`. Once the window is full the oldest frame is released.
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        self.frames.push_back(frame);
        if self.frames.len() >= self.capacity {
            self.frames.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Remaining frames in read order
    pub fn drain(&mut self) -> impl Iterator<Item = Frame> + '_ {
        self.frames.drain(..)
    }
}
