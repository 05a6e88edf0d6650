//! Recording state and configuration

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Current state of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    /// Channels are flushing their output
    Finishing,
    Complete,
}

/// Wall-clock span of a recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSpan {
    pub unix_start_ms: u64,
    pub unix_end_ms: u64,
    pub duration_ms: f64,
}

impl RecordingSpan {
    pub fn start() -> Self {
        let now = Utc::now().timestamp_millis() as u64;
        Self {
            unix_start_ms: now,
            unix_end_ms: now,
            duration_ms: 0.0,
        }
    }

    pub fn end(&mut self) {
        self.unix_end_ms = Utc::now().timestamp_millis() as u64;
        self.duration_ms = self.unix_end_ms.saturating_sub(self.unix_start_ms) as f64;
    }
}

/// Configuration for one video recording
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub duration: Duration,
    pub frame_rate: u32,
    pub record_audio: bool,
    pub microphone: Option<String>,
    /// Extra audio beyond `duration`
    pub audio_pre_roll: Duration,
}

/// Files produced by a finished recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOutput {
    pub video: PathBuf,
    /// Present only when audio was captured
    pub audio: Option<PathBuf>,
    pub span: RecordingSpan,
}
