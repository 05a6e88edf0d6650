//! Microphone capture using cpal, written to WAV with hound
//!
//! The cpal stream is not `Send`, so it is built and kept alive on its own
//! thread. The thread records for a fixed window (video duration plus a
//! pre-roll margin) or until stopped, then finalizes the WAV file.

use super::traits::AudioDeviceInfo;
use crate::recorder::channel::{
    AudioChannelFactory, ChannelType, RecordingChannel, RecordingError, RecordingResult,
};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type WavWriter = hound::WavWriter<BufWriter<File>>;

/// List input devices
pub fn list_microphones() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .filter_map(|d| d.name().ok())
            .map(|name| AudioDeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            Vec::new()
        }
    }
}

fn find_input_device(host: &Host, name: Option<&str>) -> RecordingResult<Device> {
    match name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| RecordingError::DeviceNotFound(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| RecordingError::DeviceNotFound(format!("Microphone '{}'", wanted))),
        None => host
            .default_input_device()
            .ok_or_else(|| RecordingError::DeviceNotFound("No default input device".to_string())),
    }
}

pub struct MicrophoneFactory;

impl AudioChannelFactory for MicrophoneFactory {
    fn create(
        &self,
        output: &Path,
        duration: Duration,
        device: Option<&str>,
    ) -> Box<dyn RecordingChannel> {
        Box::new(MicrophoneChannel::new(
            output.to_path_buf(),
            duration,
            device.map(str::to_string),
        ))
    }
}

pub struct MicrophoneChannel {
    id: String,
    device_name: Option<String>,
    output: PathBuf,
    duration: Duration,
    is_recording: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<RecordingResult<()>>>,
    output_files: Vec<PathBuf>,
}

impl MicrophoneChannel {
    pub fn new(output: PathBuf, duration: Duration, device_name: Option<String>) -> Self {
        Self {
            id: "microphone".to_string(),
            device_name,
            output,
            duration,
            is_recording: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            output_files: Vec::new(),
        }
    }
}

#[async_trait]
impl RecordingChannel for MicrophoneChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Microphone
    }

    fn is_required(&self) -> bool {
        false
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.is_recording.load(Ordering::SeqCst) {
            return Err(RecordingError::AlreadyRecording);
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let job = CaptureJob {
            device_name: self.device_name.clone(),
            output: self.output.clone(),
            duration: self.duration,
            stop: self.stop.clone(),
            is_recording: self.is_recording.clone(),
        };
        self.stop.store(false, Ordering::SeqCst);
        self.is_recording.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("microphone".to_string())
            .spawn(move || job.run(ready_tx))?;

        // Wait for the stream to come up so device errors surface here
        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| RecordingError::CaptureError(e.to_string()))?;

        match ready {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                tracing::info!("Microphone capture started for {:?}", self.duration);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.is_recording.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                self.is_recording.store(false, Ordering::SeqCst);
                Err(RecordingError::CaptureError(
                    "Microphone thread exited during start".to_string(),
                ))
            }
        }
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    async fn finish(&mut self) -> RecordingResult<()> {
        let Some(handle) = self.worker.take() else {
            return Err(RecordingError::NotRecording);
        };

        let result = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| RecordingError::CaptureError(e.to_string()))?
            .map_err(|_| RecordingError::CaptureError("Microphone thread panicked".to_string()));

        // Listed even on failure so a half-written file gets discarded
        if self.output.exists() {
            self.output_files.push(self.output.clone());
        }
        result??;
        tracing::info!("Microphone capture finished: {:?}", self.output);
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.output_files.clone()
    }
}

struct CaptureJob {
    device_name: Option<String>,
    output: PathBuf,
    duration: Duration,
    stop: Arc<AtomicBool>,
    is_recording: Arc<AtomicBool>,
}

impl CaptureJob {
    fn run(self, ready: mpsc::Sender<RecordingResult<()>>) -> RecordingResult<()> {
        let result = self.capture(&ready);
        self.is_recording.store(false, Ordering::SeqCst);
        if let Err(e) = &result {
            tracing::error!("Microphone capture failed: {}", e);
        }
        result
    }

    fn capture(&self, ready: &mpsc::Sender<RecordingResult<()>>) -> RecordingResult<()> {
        let (stream, writer) = match self.open_stream() {
            Ok(opened) => opened,
            Err(e) => {
                let _ = ready.send(Err(e));
                return Ok(());
            }
        };
        let _ = ready.send(Ok(()));

        let started = Instant::now();
        while started.elapsed() < self.duration && !self.stop.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }
        drop(stream);

        let writer = writer.lock().take();
        if let Some(writer) = writer {
            writer
                .finalize()
                .map_err(|e| RecordingError::CaptureError(format!("WAV finalize: {}", e)))?;
        }
        Ok(())
    }

    fn open_stream(&self) -> RecordingResult<(cpal::Stream, Arc<Mutex<Option<WavWriter>>>)> {
        let host = cpal::default_host();
        let device = find_input_device(&host, self.device_name.as_deref())?;
        let supported = device
            .default_input_config()
            .map_err(|e| RecordingError::ConfigurationError(e.to_string()))?;

        let channels = supported.channels() as usize;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: supported.sample_rate().0,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        // Filled once the stream is live; samples before that are dropped
        let writer: Arc<Mutex<Option<WavWriter>>> = Arc::new(Mutex::new(None));

        let config = supported.config();
        let on_error = |err: cpal::StreamError| tracing::error!("Microphone stream error: {}", err);
        let stream = create_wav_after(&self.output, spec, &writer, || {
            let stream = match supported.sample_format() {
                SampleFormat::F32 => {
                    let w = writer.clone();
                    device.build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            write_mono(&w, data, channels, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        },
                        on_error,
                        None,
                    )
                }
                SampleFormat::I16 => {
                    let w = writer.clone();
                    device.build_input_stream(
                        &config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            write_mono(&w, data, channels, |s| s)
                        },
                        on_error,
                        None,
                    )
                }
                SampleFormat::U16 => {
                    let w = writer.clone();
                    device.build_input_stream(
                        &config,
                        move |data: &[u16], _: &cpal::InputCallbackInfo| {
                            write_mono(&w, data, channels, |s| (s as i32 - 32768) as i16)
                        },
                        on_error,
                        None,
                    )
                }
                other => {
                    return Err(RecordingError::ConfigurationError(format!(
                        "Unsupported sample format {:?}",
                        other
                    )))
                }
            }
            .map_err(|e| RecordingError::CaptureError(format!("Build input stream: {}", e)))?;

            stream
                .play()
                .map_err(|e| RecordingError::CaptureError(format!("Start input stream: {}", e)))?;
            Ok(stream)
        })?;

        tracing::info!(
            "Microphone opened: {} ({}Hz, {}ch -> mono)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            spec.sample_rate,
            channels
        );
        Ok((stream, writer))
    }
}

/// Bring the stream up with `start`, then create the WAV file into `slot`.
/// A stream that fails to start leaves nothing on disk.
fn create_wav_after<S>(
    output: &Path,
    spec: hound::WavSpec,
    slot: &Mutex<Option<WavWriter>>,
    start: impl FnOnce() -> RecordingResult<S>,
) -> RecordingResult<S> {
    let stream = start()?;
    let writer = hound::WavWriter::create(output, spec)
        .map_err(|e| RecordingError::CaptureError(format!("WAV create: {}", e)))?;
    *slot.lock() = Some(writer);
    Ok(stream)
}

/// Downmix interleaved samples to mono and append them
fn write_mono<T: Copy>(
    writer: &Mutex<Option<WavWriter>>,
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> i16,
) {
    let mut guard = writer.lock();
    let Some(writer) = guard.as_mut() else {
        return;
    };
    for frame in data.chunks(channels.max(1)) {
        let sum: i32 = frame.iter().map(|s| convert(*s) as i32).sum();
        let sample = (sum / frame.len() as i32) as i16;
        if writer.write_sample(sample).is_err() {
            tracing::warn!("Dropping audio samples after write failure");
            return;
        }
    }
}
