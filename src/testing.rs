//! Test doubles for the external seams: camera, encoder, microphone,
//! transcoder and remote storage.

use crate::capture::{CameraProvider, FrameSource};
use crate::pipeline::Frame;
use crate::recorder::{
    AudioChannelFactory, ChannelType, EncodeSink, RecordingChannel, RecordingError, SinkFactory,
    SinkSpec,
};
use crate::recorder::channel::RecordingResult;
use crate::transcode::{TranscodeJob, Transcoder};
use crate::upload::{ListFilter, RemoteEntry, RemoteStorage, StorageError, StorageResult};
use crate::utils::{BoothError, BoothResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Camera
// =============================================================================

struct CameraState {
    width: u32,
    height: u32,
    color: Mutex<[u8; 3]>,
    fail_open: AtomicBool,
    failing_reads: AtomicU32,
    opened: AtomicU32,
    closed: AtomicU32,
}

/// Camera producing solid-colour frames about once per millisecond
#[derive(Clone)]
pub struct SyntheticCamera {
    state: Arc<CameraState>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(CameraState {
                width,
                height,
                color: Mutex::new([128, 128, 128]),
                fail_open: AtomicBool::new(false),
                failing_reads: AtomicU32::new(0),
                opened: AtomicU32::new(0),
                closed: AtomicU32::new(0),
            }),
        }
    }

    pub fn provider(&self) -> Arc<dyn CameraProvider> {
        Arc::new(self.clone())
    }

    pub fn opened(&self) -> u32 {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u32 {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.opened() > self.closed()
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` reads; `u32::MAX` fails every read
    pub fn fail_next_reads(&self, count: u32) {
        self.state.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn set_color(&self, color: [u8; 3]) {
        *self.state.color.lock() = color;
    }
}

impl CameraProvider for SyntheticCamera {
    fn open(&self) -> BoothResult<Box<dyn FrameSource>> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(BoothError::DeviceUnavailable("synthetic open failure".into()));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct SyntheticSource {
    state: Arc<CameraState>,
    closed: bool,
}

impl FrameSource for SyntheticSource {
    fn configure(&mut self, _frame_rate: u32, _width: u32, _height: u32) -> BoothResult<()> {
        Ok(())
    }

    fn read_frame(&mut self) -> BoothResult<Frame> {
        std::thread::sleep(Duration::from_millis(1));
        let failing = self.state.failing_reads.load(Ordering::SeqCst);
        if failing > 0 {
            if failing != u32::MAX {
                self.state.failing_reads.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(BoothError::ReadFailed("synthetic read miss".into()));
        }
        let color = *self.state.color.lock();
        Ok(Frame::new(RgbImage::from_pixel(
            self.state.width,
            self.state.height,
            Rgb(color),
        )))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// =============================================================================
// Encode sinks
// =============================================================================

#[derive(Default)]
struct SinkState {
    frames: Mutex<HashMap<PathBuf, Vec<(u32, u32)>>>,
    captured: Mutex<HashMap<PathBuf, Vec<DateTime<Utc>>>>,
    fail_opens: AtomicBool,
    fail_writes_after: Mutex<Option<usize>>,
    open_attempts: AtomicU32,
}

/// Sinks that create their file on open like an encoder process, record
/// frame sizes and capture times, and write a marker on finish
#[derive(Clone, Default)]
pub struct MemorySinks {
    state: Arc<SinkState>,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<dyn SinkFactory> {
        Arc::new(self.clone())
    }

    pub fn fail_opens(&self, fail: bool) {
        self.state.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Every write after the first `frames` fails
    pub fn fail_writes_after(&self, frames: usize) {
        *self.state.fail_writes_after.lock() = Some(frames);
    }

    pub fn open_attempts(&self) -> u32 {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    pub fn frames_written(&self, path: &Path) -> u64 {
        self.frame_sizes(path).len() as u64
    }

    pub fn frame_sizes(&self, path: &Path) -> Vec<(u32, u32)> {
        self.state
            .frames
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Capture time of each written frame, in write order
    pub fn capture_times(&self, path: &Path) -> Vec<DateTime<Utc>> {
        self.state
            .captured
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

impl SinkFactory for MemorySinks {
    fn create(&self, spec: &SinkSpec) -> BoothResult<Box<dyn EncodeSink>> {
        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_opens.load(Ordering::SeqCst) {
            return Err(BoothError::EncodeSinkFailed("synthetic open failure".into()));
        }
        std::fs::write(&spec.path, b"")?;
        Ok(Box::new(MemorySink {
            path: spec.path.clone(),
            sizes: Vec::new(),
            captured: Vec::new(),
            state: self.state.clone(),
        }))
    }
}

struct MemorySink {
    path: PathBuf,
    sizes: Vec<(u32, u32)>,
    captured: Vec<DateTime<Utc>>,
    state: Arc<SinkState>,
}

impl EncodeSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> BoothResult<()> {
        if let Some(limit) = *self.state.fail_writes_after.lock() {
            if self.sizes.len() >= limit {
                return Err(BoothError::EncodeSinkFailed("disk full".into()));
            }
        }
        self.sizes.push((frame.width(), frame.height()));
        self.captured.push(frame.captured_at());
        Ok(())
    }

    fn finish(self: Box<Self>) -> BoothResult<u64> {
        let MemorySink {
            path,
            sizes,
            captured,
            state,
        } = *self;
        let count = sizes.len() as u64;
        std::fs::write(&path, format!("frames:{}", count))?;
        state.frames.lock().insert(path.clone(), sizes);
        state.captured.lock().insert(path, captured);
        Ok(count)
    }
}

// =============================================================================
// Microphone
// =============================================================================

/// Audio channels that write their file as soon as they start
#[derive(Default)]
pub struct FakeAudioFactory {
    fail_start: Arc<AtomicBool>,
    fail_finish: Arc<AtomicBool>,
    requested: Mutex<Vec<(Duration, Option<String>)>>,
}

impl FakeAudioFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Write the file, then fail while finalizing it
    pub fn fail_finish(&self, fail: bool) {
        self.fail_finish.store(fail, Ordering::SeqCst);
    }

    /// Capture window and device of every channel created so far
    pub fn requested(&self) -> Vec<(Duration, Option<String>)> {
        self.requested.lock().clone()
    }
}

impl AudioChannelFactory for FakeAudioFactory {
    fn create(
        &self,
        output: &Path,
        duration: Duration,
        device: Option<&str>,
    ) -> Box<dyn RecordingChannel> {
        self.requested
            .lock()
            .push((duration, device.map(str::to_string)));
        Box::new(FakeAudioChannel {
            output: output.to_path_buf(),
            fail_start: self.fail_start.load(Ordering::SeqCst),
            fail_finish: self.fail_finish.load(Ordering::SeqCst),
            started: false,
            stopped: AtomicBool::new(false),
            output_files: Vec::new(),
        })
    }
}

struct FakeAudioChannel {
    output: PathBuf,
    fail_start: bool,
    fail_finish: bool,
    started: bool,
    stopped: AtomicBool,
    output_files: Vec<PathBuf>,
}

#[async_trait]
impl RecordingChannel for FakeAudioChannel {
    fn id(&self) -> &str {
        "fake-microphone"
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Microphone
    }

    fn is_required(&self) -> bool {
        false
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.fail_start {
            return Err(RecordingError::DeviceNotFound("no microphone".into()));
        }
        std::fs::write(&self.output, b"RIFF")?;
        self.started = true;
        Ok(())
    }

    fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn finish(&mut self) -> RecordingResult<()> {
        if !self.started {
            return Err(RecordingError::NotRecording);
        }
        self.started = false;
        if self.output.exists() {
            self.output_files.push(self.output.clone());
        }
        if self.fail_finish {
            return Err(RecordingError::CaptureError("WAV finalize: truncated".into()));
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.started && !self.stopped.load(Ordering::SeqCst)
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.output_files.clone()
    }
}

// =============================================================================
// Transcoder
// =============================================================================

/// Writes the input video followed by the job name to the output
#[derive(Default)]
pub struct StubTranscoder {
    jobs: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
    write_empty: AtomicBool,
}

impl StubTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, job: &str) {
        *self.fail_on.lock() = Some(job.to_string());
    }

    pub fn write_empty(&self, empty: bool) {
        self.write_empty.store(empty, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<String> {
        self.jobs.lock().clone()
    }
}

impl Transcoder for StubTranscoder {
    fn run(&self, job: &TranscodeJob) -> BoothResult<()> {
        self.jobs.lock().push(job.name().to_string());
        if self.fail_on.lock().as_deref() == Some(job.name()) {
            return Err(BoothError::TranscodeFailed {
                message: format!("{} exited with 1", job.name()),
                preserved: None,
            });
        }

        let video = match job {
            TranscodeJob::Mux { video, .. } | TranscodeJob::Overlay { video, .. } => video,
        };
        if self.write_empty.load(Ordering::SeqCst) {
            std::fs::write(job.output(), b"")?;
        } else {
            let mut content = std::fs::read(video)?;
            content.extend_from_slice(format!("\n{}", job.name()).as_bytes());
            std::fs::write(job.output(), content)?;
        }
        Ok(())
    }
}

// =============================================================================
// Remote storage
// =============================================================================

/// In-memory storage with scripted failures. Calls are logged as
/// `op:parent:name`.
#[derive(Default)]
pub struct ScriptedStorage {
    failures: Mutex<HashMap<String, u32>>,
    uploads_only_into: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    folders: Mutex<Vec<(String, RemoteEntry)>>,
    next_id: AtomicU32,
}

impl ScriptedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `op` ("list", "create", "upload",
    /// "delete" or "share")
    pub fn fail_times(&self, op: &str, times: u32) {
        self.failures.lock().insert(op.to_string(), times);
    }

    /// Uploads into any folder other than `parent` always fail
    pub fn fail_uploads_outside(&self, parent: &str) {
        *self.uploads_only_into.lock() = Some(parent.to_string());
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn scripted_failure(&self, op: &str) -> StorageResult<()> {
        let mut failures = self.failures.lock();
        match failures.get_mut(op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StorageError::Status {
                    status: 503,
                    body: "backend unavailable".into(),
                })
            }
            _ => Ok(()),
        }
    }

    fn next_id(&self, kind: &str) -> String {
        format!("{}-{}", kind, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl RemoteStorage for ScriptedStorage {
    async fn list(&self, parent: &str, _filter: ListFilter) -> StorageResult<Vec<RemoteEntry>> {
        self.record(format!("list:{}", parent));
        self.scripted_failure("list")?;
        Ok(self
            .folders
            .lock()
            .iter()
            .filter(|(p, _)| p == parent)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn create_folder(&self, parent: &str, name: &str) -> StorageResult<String> {
        self.record(format!("create:{}:{}", parent, name));
        self.scripted_failure("create")?;
        let id = self.next_id("folder");
        self.folders.lock().push((
            parent.to_string(),
            RemoteEntry {
                id: id.clone(),
                name: name.to_string(),
            },
        ));
        Ok(id)
    }

    async fn upload_file(&self, parent: &str, path: &Path, _mime_type: &str) -> StorageResult<String> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.record(format!("upload:{}:{}", parent, name));
        self.scripted_failure("upload")?;
        if let Some(only) = self.uploads_only_into.lock().as_deref() {
            if only != parent {
                return Err(StorageError::Status {
                    status: 500,
                    body: format!("upload into {} rejected", parent),
                });
            }
        }
        if !path.is_file() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "artifact missing",
            )));
        }
        Ok(self.next_id("file"))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.record(format!("delete:{}", id));
        self.scripted_failure("delete")?;
        self.folders.lock().retain(|(_, entry)| entry.id != id);
        Ok(())
    }

    async fn make_public(&self, id: &str) -> StorageResult<()> {
        self.record(format!("share:{}", id));
        self.scripted_failure("share")
    }
}
