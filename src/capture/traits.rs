//! Capture trait definitions
//!
//! Backend-agnostic traits for camera sources plus the device descriptors
//! reported to the operator UI.

use crate::pipeline::Frame;
use crate::utils::BoothResult;
use serde::{Deserialize, Serialize};

/// A physical frame source. Implementations own the device handle; reads
/// block until the device delivers the next frame.
pub trait FrameSource: Send {
    /// Apply frame rate and resolution. The device may pick the closest mode.
    fn configure(&mut self, frame_rate: u32, width: u32, height: u32) -> BoothResult<()>;

    /// Read one raw frame in device orientation
    fn read_frame(&mut self) -> BoothResult<Frame>;

    /// Release the device. Must be idempotent.
    fn close(&mut self);
}

/// Opens the configured camera
pub trait CameraProvider: Send + Sync {
    fn open(&self) -> BoothResult<Box<dyn FrameSource>>;
}

/// Information about a camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Backend index or identifier
    pub id: String,

    pub name: String,
}

/// Information about an audio input device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    pub name: String,

    /// Whether this is the host default input
    pub is_default: bool,
}
