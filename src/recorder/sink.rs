//! Encode sinks for recorded video
//!
//! The default sink pipes raw RGB24 frames into an ffmpeg process that
//! writes H.264 MP4. Opening a sink is retried a few times because capture
//! devices and encoders occasionally need a moment after the previous
//! owner released them.

use crate::pipeline::Frame;
use crate::utils::{BoothError, BoothResult};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

pub const SINK_OPEN_ATTEMPTS: u32 = 5;
pub const SINK_OPEN_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

pub trait EncodeSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> BoothResult<()>;

    /// Flush and close; returns frames written
    fn finish(self: Box<Self>) -> BoothResult<u64>;
}

pub trait SinkFactory: Send + Sync {
    fn create(&self, spec: &SinkSpec) -> BoothResult<Box<dyn EncodeSink>>;
}

/// Open a sink, retrying with a fixed backoff
pub fn open_with_retry(
    factory: &dyn SinkFactory,
    spec: &SinkSpec,
    attempts: u32,
    backoff: Duration,
) -> BoothResult<Box<dyn EncodeSink>> {
    let mut last_error = None;
    for attempt in 1..=attempts {
        match factory.create(spec) {
            Ok(sink) => return Ok(sink),
            Err(e) => {
                tracing::warn!(
                    "Attempt {}/{}: failed to open encode sink {:?}: {}",
                    attempt,
                    attempts,
                    spec.path,
                    e
                );
                last_error = Some(e);
                if attempt < attempts {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    Err(BoothError::EncodeSinkFailed(format!(
        "Could not open {:?} after {} attempts: {}",
        spec.path,
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

pub struct FfmpegSinkFactory {
    binary: PathBuf,
}

impl FfmpegSinkFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegSinkFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn create(&self, spec: &SinkSpec) -> BoothResult<Box<dyn EncodeSink>> {
        Ok(Box::new(FfmpegSink::spawn(&self.binary, spec)?))
    }
}

pub struct FfmpegSink {
    process: Child,
    stdin: Option<ChildStdin>,
    frame_size: usize,
    frame_count: u64,
}

pub(crate) fn encoder_args(spec: &SinkSpec) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-s".to_string(),
        format!("{}x{}", spec.width, spec.height),
        "-r".to_string(),
        spec.frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "18".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        spec.path.to_string_lossy().to_string(),
    ]
}

impl FfmpegSink {
    fn spawn(binary: &std::path::Path, spec: &SinkSpec) -> BoothResult<Self> {
        let args = encoder_args(spec);
        tracing::info!("Starting FFmpeg encoder: {:?}", args);

        let mut process = Command::new(binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BoothError::EncodeSinkFailed(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| BoothError::EncodeSinkFailed("Failed to capture FFmpeg stdin".to_string()))?;

        Ok(Self {
            process,
            stdin: Some(stdin),
            frame_size: (spec.width * spec.height * 3) as usize,
            frame_count: 0,
        })
    }
}

impl EncodeSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> BoothResult<()> {
        let data = frame.as_bytes();
        if data.len() != self.frame_size {
            return Err(BoothError::EncodeSinkFailed(format!(
                "Frame is {} bytes, encoder expects {}",
                data.len(),
                self.frame_size
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BoothError::EncodeSinkFailed("Encoder already closed".to_string()))?;
        stdin
            .write_all(data)
            .map_err(|e| BoothError::EncodeSinkFailed(format!("Failed to write frame: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> BoothResult<u64> {
        let FfmpegSink {
            process,
            stdin,
            frame_count: frames,
            ..
        } = *self;
        // EOF on stdin ends the encode
        drop(stdin);
        let output = process
            .wait_with_output()
            .map_err(|e| BoothError::EncodeSinkFailed(format!("FFmpeg wait failed: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BoothError::EncodeSinkFailed(format!(
                "FFmpeg exited with {}: {}",
                output.status,
                stderr.lines().last().unwrap_or("")
            )));
        }
        tracing::info!("FFmpeg encoder finished: {} frames", frames);
        Ok(frames)
    }
}
