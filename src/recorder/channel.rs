//! Recording channel trait
//!
//! A channel is one capture activity of a video recording (camera frames or
//! microphone audio). The coordinator starts all channels together and
//! waits for each to flush its output.

use crate::utils::BoothError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Video,
    Microphone,
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Encode sink error: {0}")]
    EncodeSink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecordingResult<T> = Result<T, RecordingError>;

impl From<RecordingError> for BoothError {
    fn from(error: RecordingError) -> Self {
        match error {
            RecordingError::AlreadyRecording | RecordingError::NotRecording => {
                BoothError::InvalidState(error.to_string())
            }
            RecordingError::DeviceNotFound(msg) => BoothError::DeviceUnavailable(msg),
            RecordingError::ConfigurationError(msg) => BoothError::Config(msg),
            RecordingError::CaptureError(msg) => BoothError::ReadFailed(msg),
            RecordingError::EncodeSink(msg) => BoothError::EncodeSinkFailed(msg),
            RecordingError::Io(e) => BoothError::Io(e),
        }
    }
}

#[async_trait]
pub trait RecordingChannel: Send + Sync {
    fn id(&self) -> &str;

    fn channel_type(&self) -> ChannelType;

    /// Whether the recording fails when this channel cannot start
    fn is_required(&self) -> bool {
        true
    }

    /// Open the device and begin capturing in the background
    async fn start(&mut self) -> RecordingResult<()>;

    /// Ask the channel to end capture now. Does not wait.
    fn request_stop(&self);

    /// Wait for capture to end and the output file to be complete
    async fn finish(&mut self) -> RecordingResult<()>;

    fn is_recording(&self) -> bool;

    fn output_files(&self) -> Vec<PathBuf>;
}

/// Builds the audio channel for one recording
pub trait AudioChannelFactory: Send + Sync {
    /// `duration` already includes the pre-roll margin
    fn create(
        &self,
        output: &Path,
        duration: Duration,
        device: Option<&str>,
    ) -> Box<dyn RecordingChannel>;
}
