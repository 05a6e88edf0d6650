//! Live frame pipeline
//!
//! A single worker thread owns the camera lease while the pipeline runs. Each
//! iteration reads one frame, serves a pending still capture at full canvas
//! size, then produces a preview frame (overlay and countdown glyph applied)
//! into the bounded preview queue. Failed reads are absorbed with a short
//! backoff; they surface only to a pending capture.

use super::frame::Frame;
use super::glyph::burn_countdown;
use super::queue::{frame_queue, FrameReceiver, FrameSender, PREVIEW_QUEUE_CAPACITY};
use super::transform::FrameTransform;
use crate::capture::{CameraDevice, DeviceLease, DeviceOwner};
use crate::compose::{blend_into, Overlay};
use crate::utils::{BoothError, BoothResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Clone)]
pub struct PipelineConfig {
    /// Full-size transform for still captures
    pub capture: FrameTransform,

    /// Downscaled transform for the live preview
    pub preview: FrameTransform,

    /// Overlay blended into preview frames
    pub preview_overlay: Option<Arc<Overlay>>,

    /// Pause after a failed read
    pub read_backoff: Duration,

    /// Consecutive failed reads before a pending capture fails
    pub capture_read_attempts: u32,

    pub capture_timeout: Duration,
}

impl PipelineConfig {
    pub fn new(capture: FrameTransform, preview: FrameTransform) -> Self {
        Self {
            capture,
            preview,
            preview_overlay: None,
            read_backoff: Duration::from_millis(10),
            capture_read_attempts: 3,
            capture_timeout: Duration::from_secs(3),
        }
    }
}

type CaptureReply = mpsc::Sender<BoothResult<Frame>>;

pub struct FramePipeline {
    device: Arc<CameraDevice>,
    config: PipelineConfig,
    running: Arc<AtomicBool>,
    /// Written only by the session control task
    countdown: Arc<RwLock<Option<u32>>>,
    pending_capture: Arc<Mutex<Option<CaptureReply>>>,
    receiver: Mutex<Option<FrameReceiver>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FramePipeline {
    pub fn new(device: Arc<CameraDevice>, config: PipelineConfig) -> Self {
        Self {
            device,
            config,
            running: Arc::new(AtomicBool::new(false)),
            countdown: Arc::new(RwLock::new(None)),
            pending_capture: Arc::new(Mutex::new(None)),
            receiver: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Acquire the camera and start the worker. No-op if already running.
    pub fn start(&self) -> BoothResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() && self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        // A worker that exited on its own still needs joining
        if let Some(stale) = worker.take() {
            let _ = stale.join();
        }

        let lease = self.device.acquire(DeviceOwner::Preview)?;
        let (sender, receiver) = frame_queue(PREVIEW_QUEUE_CAPACITY);
        *self.receiver.lock() = Some(receiver);
        self.running.store(true, Ordering::SeqCst);

        let ctx = WorkerContext {
            lease,
            sender,
            config: self.config.clone(),
            running: self.running.clone(),
            countdown: self.countdown.clone(),
            pending_capture: self.pending_capture.clone(),
        };
        let handle = std::thread::Builder::new()
            .name("frame-pipeline".to_string())
            .spawn(move || ctx.run())?;
        *worker = Some(handle);

        tracing::info!("Frame pipeline started");
        Ok(())
    }

    /// Stop the worker and release the camera. Blocks until the worker exits.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Frame pipeline worker panicked");
            }
            tracing::info!("Frame pipeline stopped");
        }
        *self.receiver.lock() = None;
        *self.countdown.write() = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Most recent preview frame, discarding older queued ones
    pub fn latest_preview(&self) -> Option<Frame> {
        self.receiver.lock().as_ref().and_then(|rx| rx.latest())
    }

    /// Next preview frame in read order
    pub fn next_preview(&self) -> Option<Frame> {
        self.receiver.lock().as_ref().and_then(|rx| rx.try_next())
    }

    pub fn dropped_frames(&self) -> u64 {
        self.receiver
            .lock()
            .as_ref()
            .map(|rx| rx.dropped())
            .unwrap_or(0)
    }

    /// Countdown value burned into preview frames; `None` hides it
    pub fn set_countdown(&self, value: Option<u32>) {
        *self.countdown.write() = value;
    }

    /// Take one full-size still. Blocks until the worker delivers it.
    ///
    /// The frame is transformed but carries no preview overlay or glyph.
    pub fn capture_frame(&self) -> BoothResult<Frame> {
        if !self.is_running() {
            return Err(BoothError::DeviceUnavailable(
                "Frame pipeline is not running".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel();
        *self.pending_capture.lock() = Some(tx);

        match rx.recv_timeout(self.config.capture_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.pending_capture.lock().take();
                Err(BoothError::ReadFailed(format!(
                    "No frame within {:?}",
                    self.config.capture_timeout
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BoothError::DeviceUnavailable(
                "Frame pipeline stopped during capture".to_string(),
            )),
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    lease: DeviceLease,
    sender: FrameSender,
    config: PipelineConfig,
    running: Arc<AtomicBool>,
    countdown: Arc<RwLock<Option<u32>>>,
    pending_capture: Arc<Mutex<Option<CaptureReply>>>,
}

impl WorkerContext {
    fn run(mut self) {
        let mut failures: u32 = 0;
        let mut frames: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            match self.lease.read_frame() {
                Ok(raw) => {
                    failures = 0;
                    frames += 1;
                    if let Some(reply) = self.pending_capture.lock().take() {
                        let _ = reply.send(Ok(self.config.capture.apply(raw.clone())));
                    }
                    let preview = self.render_preview(raw);
                    self.sender.offer(preview);
                }
                Err(e) => {
                    failures += 1;
                    tracing::debug!("Frame read failed ({} in a row): {}", failures, e);
                    if failures >= self.config.capture_read_attempts {
                        if let Some(reply) = self.pending_capture.lock().take() {
                            let _ = reply.send(Err(e));
                        }
                    }
                    std::thread::sleep(self.config.read_backoff);
                }
            }
        }

        if let Some(reply) = self.pending_capture.lock().take() {
            let _ = reply.send(Err(BoothError::DeviceUnavailable(
                "Frame pipeline stopped during capture".to_string(),
            )));
        }
        tracing::debug!("Frame pipeline worker exiting after {} frames", frames);
        // Lease drops here and releases the camera
    }

    fn render_preview(&self, raw: Frame) -> Frame {
        let frame = self.config.preview.apply(raw);
        let overlay = self.config.preview_overlay.clone();
        let countdown = *self.countdown.read();
        if overlay.is_none() && countdown.is_none() {
            return frame;
        }
        frame.map(|mut image| {
            if let Some(overlay) = overlay {
                blend_into(&mut image, &overlay);
            }
            if let Some(value) = countdown {
                burn_countdown(&mut image, value);
            }
            image
        })
    }
}
