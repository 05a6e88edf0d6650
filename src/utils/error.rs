//! Error types and handling
//!
//! Common error types used across the booth. Each variant maps to one of the
//! failure kinds a session can end with, so the UI layer can render a cause
//! without knowing which stage produced it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Booth-wide error type
#[derive(Error, Debug)]
pub enum BoothError {
    /// Camera could not be opened, configured or is held by another owner
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// A frame read missed; absorbed by the pipeline, surfaced only by capture
    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Encode sink failed: {0}")]
    EncodeSinkFailed(String),

    /// External mux/overlay step failed. `preserved` names the untouched raw
    /// artifact when it could be kept.
    #[error("Transcode failed: {message}")]
    TranscodeFailed {
        message: String,
        preserved: Option<PathBuf>,
    },

    /// Remote call exhausted its retries. The local artifact is left on disk.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BoothError {
    /// Stable machine-readable code for the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            BoothError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            BoothError::ReadFailed(_) => "READ_FAILED",
            BoothError::CompositionFailed(_) => "COMPOSITION_FAILED",
            BoothError::EncodeSinkFailed(_) => "ENCODE_SINK_FAILED",
            BoothError::TranscodeFailed { .. } => "TRANSCODE_FAILED",
            BoothError::PublishFailed(_) => "PUBLISH_FAILED",
            BoothError::Cancelled => "CANCELLED",
            BoothError::InvalidState(_) => "INVALID_STATE",
            BoothError::Config(_) => "CONFIG_ERROR",
            BoothError::Io(_) => "IO_ERROR",
            BoothError::Image(_) => "IMAGE_ERROR",
            BoothError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Cancellation is operator-initiated and not reported as a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BoothError::Cancelled)
    }
}

/// Error response for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&BoothError> for ErrorResponse {
    fn from(error: &BoothError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<BoothError> for ErrorResponse {
    fn from(error: BoothError) -> Self {
        ErrorResponse::from(&error)
    }
}

/// Result type alias using BoothError
pub type BoothResult<T> = Result<T, BoothError>;
