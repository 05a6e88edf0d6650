//! Session phases, requests, events and results

use crate::pipeline::Frame;
use crate::utils::ErrorResponse;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// One still
    Photo,
    /// Several stills composed into one collage or template
    Burst,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", content = "value", rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Seconds left before the next shot (or before recording starts)
    Countdown(u32),
    Capturing,
    Composing,
    Publishing,
    Result,
    Error,
    Cancelled,
}

impl SessionPhase {
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            SessionPhase::Idle | SessionPhase::Countdown(_) | SessionPhase::Capturing
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub kind: SessionKind,
    /// Overrides the configured burst count
    pub shot_count: Option<u32>,
    /// Overrides the configured recording duration
    pub duration_seconds: Option<u32>,
    /// Overrides the configured audio flag
    pub record_audio: Option<bool>,
    /// Upload into the previous pooled folder instead of a new one
    pub reuse_last: bool,
}

impl SessionRequest {
    fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            shot_count: None,
            duration_seconds: None,
            record_audio: None,
            reuse_last: false,
        }
    }

    pub fn photo() -> Self {
        Self::new(SessionKind::Photo)
    }

    pub fn burst(shot_count: Option<u32>) -> Self {
        Self {
            shot_count,
            ..Self::new(SessionKind::Burst)
        }
    }

    pub fn video(duration_seconds: Option<u32>) -> Self {
        Self {
            duration_seconds,
            ..Self::new(SessionKind::Video)
        }
    }

    pub fn with_audio(mut self, record_audio: bool) -> Self {
        self.record_audio = Some(record_audio);
        self
    }

    pub fn with_reuse_last(mut self, reuse_last: bool) -> Self {
        self.reuse_last = reuse_last;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTarget {
    Shots(u32),
    Duration(Duration),
}

/// The active session. Owned and mutated only by the control task.
#[derive(Debug)]
pub struct CaptureSession {
    pub id: Uuid,
    pub kind: SessionKind,
    pub target: SessionTarget,
    pub started_at: DateTime<Local>,
    frames: Vec<Frame>,
    skipped: u32,
}

impl CaptureSession {
    pub fn new(kind: SessionKind, target: SessionTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target,
            started_at: Local::now(),
            frames: Vec::new(),
            skipped: 0,
        }
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn skip_shot(&mut self) {
        self.skipped += 1;
    }

    pub fn captured(&self) -> u32 {
        self.frames.len() as u32
    }

    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Shots still owed, counting skipped ones as taken
    pub fn shots_remaining(&self) -> u32 {
        match self.target {
            SessionTarget::Shots(n) => n.saturating_sub(self.captured() + self.skipped),
            SessionTarget::Duration(_) => 0,
        }
    }

    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_id: Uuid,
    pub kind: SessionKind,
    pub artifact: PathBuf,
    /// Absent in offline mode
    pub link: Option<String>,
    pub qr_path: Option<PathBuf>,
}

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    PhaseChanged {
        phase: SessionPhase,
    },
    /// Recording time left in a video session
    Countdown {
        remaining: u32,
    },
    ShotCaptured {
        index: u32,
        total: u32,
    },
    ShotSkipped {
        index: u32,
        total: u32,
        reason: String,
    },
    Completed {
        result: SessionResult,
    },
    /// `artifact` names a local file that survived the failure, if any
    Failed {
        error: ErrorResponse,
        artifact: Option<PathBuf>,
    },
    Cancelled,
}
