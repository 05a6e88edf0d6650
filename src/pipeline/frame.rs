//! Frame type shared by capture, pipeline, compositing and recording

use crate::utils::{BoothError, BoothResult};
use chrono::{DateTime, Utc};
use image::RgbImage;

/// An immutable RGB pixel buffer plus its capture timestamp.
///
/// Frames move along the pipeline by value; transforms consume a frame and
/// return a new one carrying the original timestamp.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub const CHANNELS: u32 = 3;

    /// Wrap an image captured now
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    pub fn with_timestamp(image: RgbImage, captured_at: DateTime<Utc>) -> Self {
        Self { image, captured_at }
    }

    /// Build a frame from packed RGB24 bytes
    pub fn from_rgb24(width: u32, height: u32, data: Vec<u8>) -> BoothResult<Self> {
        let expected = (width * height * Self::CHANNELS) as usize;
        if data.len() != expected {
            return Err(BoothError::ReadFailed(format!(
                "Frame size mismatch: got {} bytes, expected {} ({}x{}x3)",
                data.len(),
                expected,
                width,
                height
            )));
        }
        RgbImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or_else(|| BoothError::ReadFailed("Invalid frame buffer".to_string()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u32 {
        Self::CHANNELS
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        (self.image.width() * Self::CHANNELS) as usize
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Replace the pixels, keeping the capture timestamp
    pub fn map(self, f: impl FnOnce(RgbImage) -> RgbImage) -> Self {
        Self {
            image: f(self.image),
            captured_at: self.captured_at,
        }
    }
}
