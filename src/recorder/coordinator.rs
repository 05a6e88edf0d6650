//! Recording coordinator
//!
//! Starts the camera and microphone channels together, waits for them to
//! finish, and discards partial output on cancellation.

use super::channel::{ChannelType, RecordingChannel, RecordingError, RecordingResult};
use super::state::{RecordingOutput, RecordingSpan, RecordingState};
use crate::utils::fs::{remove_with_retry, CLEANUP_ATTEMPTS, CLEANUP_BACKOFF};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    Started,
    /// An optional channel could not start and was dropped
    ChannelSkipped(String),
    Stopped,
    Cancelled,
    Error(String),
}

pub struct RecordingCoordinator {
    state: Arc<RwLock<RecordingState>>,
    channels: Vec<Box<dyn RecordingChannel>>,
    span: Option<RecordingSpan>,
    cleanup_backoff: Duration,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(32);
        Self {
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            channels: Vec::new(),
            span: None,
            cleanup_backoff: CLEANUP_BACKOFF,
            event_tx,
        }
    }

    pub fn with_cleanup_backoff(mut self, backoff: Duration) -> Self {
        self.cleanup_backoff = backoff;
        self
    }

    pub fn add_channel(&mut self, channel: Box<dyn RecordingChannel>) {
        tracing::info!("Adding channel: {}", channel.id());
        self.channels.push(channel);
    }

    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Start every channel. A required channel failing aborts the start and
    /// stops the channels already running; optional channels are dropped.
    pub async fn start(&mut self) -> RecordingResult<()> {
        if self.state() != RecordingState::Idle {
            return Err(RecordingError::AlreadyRecording);
        }

        let mut started: Vec<Box<dyn RecordingChannel>> = Vec::new();
        for mut channel in std::mem::take(&mut self.channels) {
            match channel.start().await {
                Ok(()) => started.push(channel),
                Err(e) if !channel.is_required() => {
                    tracing::warn!("Skipping channel {}: {}", channel.id(), e);
                    let _ = self
                        .event_tx
                        .send(RecordingEvent::ChannelSkipped(channel.id().to_string()));
                }
                Err(e) => {
                    tracing::error!("Channel {} failed to start: {}", channel.id(), e);
                    self.channels = started;
                    self.abort().await;
                    let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                    return Err(e);
                }
            }
        }

        self.channels = started;
        self.span = Some(RecordingSpan::start());
        *self.state.write() = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Started);
        tracing::info!("Recording started with {} channel(s)", self.channels.len());
        Ok(())
    }

    /// End the video now and wait for every channel to flush. Audio keeps
    /// its own window so the pre-roll margin is captured.
    pub async fn stop(&mut self) -> RecordingResult<RecordingOutput> {
        if self.state() != RecordingState::Recording {
            return Err(RecordingError::NotRecording);
        }
        *self.state.write() = RecordingState::Finishing;

        for channel in &self.channels {
            if channel.channel_type() == ChannelType::Video {
                channel.request_stop();
            }
        }

        let mut video = None;
        let mut audio = None;
        let mut failure = None;
        let mut leftovers = Vec::new();
        for channel in &mut self.channels {
            match channel.finish().await {
                Ok(()) => {
                    let file = channel.output_files().into_iter().next();
                    match channel.channel_type() {
                        ChannelType::Video => video = file,
                        ChannelType::Microphone => audio = file,
                    }
                }
                Err(e) if !channel.is_required() => {
                    tracing::warn!("Channel {} failed, continuing without it: {}", channel.id(), e);
                    leftovers.extend(channel.output_files());
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            self.discard_outputs().await;
            self.reset();
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            return Err(e);
        }
        discard(leftovers, self.cleanup_backoff).await;

        let video = video.ok_or_else(|| {
            RecordingError::CaptureError("Recording produced no video file".to_string())
        })?;
        let mut span = self.span.take().unwrap_or_else(RecordingSpan::start);
        span.end();

        *self.state.write() = RecordingState::Complete;
        let _ = self.event_tx.send(RecordingEvent::Stopped);
        tracing::info!("Recording stopped after {}ms", span.duration_ms);
        self.reset();

        Ok(RecordingOutput { video, audio, span })
    }

    /// Stop all channels and delete whatever they wrote
    pub async fn cancel(&mut self) {
        if self.state() == RecordingState::Idle && self.channels.is_empty() {
            return;
        }
        tracing::info!("Cancelling recording");
        self.abort().await;
        let _ = self.event_tx.send(RecordingEvent::Cancelled);
    }

    async fn abort(&mut self) {
        for channel in &self.channels {
            channel.request_stop();
        }
        for channel in &mut self.channels {
            if let Err(e) = channel.finish().await {
                tracing::debug!("Channel {} ended with: {}", channel.id(), e);
            }
        }
        self.discard_outputs().await;
        self.reset();
    }

    async fn discard_outputs(&self) {
        let files: Vec<PathBuf> = self
            .channels
            .iter()
            .flat_map(|c| c.output_files())
            .collect();
        discard(files, self.cleanup_backoff).await;
    }

    fn reset(&mut self) {
        self.channels.clear();
        self.span = None;
        *self.state.write() = RecordingState::Idle;
    }
}

/// Delete `files`. Retries sleep, so this runs on the blocking pool.
async fn discard(files: Vec<PathBuf>, backoff: Duration) {
    if files.is_empty() {
        return;
    }
    let cleanup = tokio::task::spawn_blocking(move || {
        for file in files {
            remove_with_retry(&file, CLEANUP_ATTEMPTS, backoff);
        }
    });
    if let Err(e) = cleanup.await {
        tracing::error!("Output cleanup task failed: {}", e);
    }
}

impl Default for RecordingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
