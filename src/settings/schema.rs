//! Booth settings schema
//!
//! Every section and field is defaulted, so a partial (or missing) settings
//! file still yields a runnable booth.

use crate::compose::{OverlayMode, SlotRect};
use crate::pipeline::Rotation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// Camera
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraSettings {
    /// Device index passed to the camera backend
    pub index: u32,
    pub rotation: Rotation,
    pub mirror: bool,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            rotation: Rotation::Clockwise90,
            mirror: false,
            frame_rate: 30,
            width: 1920,
            height: 1080,
        }
    }
}

// =============================================================================
// Canvas
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasSettings {
    /// Print canvas (4x6 inches at 300 DPI)
    pub width: u32,
    pub height: u32,
    pub preview_width: u32,
    pub preview_height: u32,
    /// Letterbox fill colour
    pub border_color: [u8; 3],
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 1800,
            preview_width: 600,
            preview_height: 900,
            border_color: [0, 0, 0],
        }
    }
}

// =============================================================================
// Photo
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFormat {
    Jpg,
    Png,
}

impl PhotoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoFormat::Jpg => "jpg",
            PhotoFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoSettings {
    pub countdown_seconds: u32,
    /// Shots in a burst session (4 or 6 for grid collages)
    pub burst_count: u32,
    pub format: PhotoFormat,
    pub overlay_path: Option<PathBuf>,
    pub overlay_mode: OverlayMode,
    /// Blend the overlay into live preview frames as well
    pub preview_overlay: bool,
    /// Background template with photo slots; takes precedence over the grid
    pub template_path: Option<PathBuf>,
    pub slots: Vec<SlotRect>,
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self {
            countdown_seconds: 3,
            burst_count: 4,
            format: PhotoFormat::Jpg,
            overlay_path: None,
            overlay_mode: OverlayMode::PerShot,
            preview_overlay: false,
            template_path: None,
            slots: Vec::new(),
        }
    }
}

// =============================================================================
// Video
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSettings {
    /// Countdown shown before recording starts
    pub countdown_seconds: u32,
    pub duration_seconds: u32,
    pub frame_rate: u32,
    pub record_audio: bool,
    /// Input device name; `None` uses the default input
    pub microphone: Option<String>,
    /// Extra audio recorded past the video duration to cover startup latency
    pub audio_pre_roll_seconds: u32,
    pub overlay_path: Option<PathBuf>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            countdown_seconds: 3,
            duration_seconds: 15,
            frame_rate: 15,
            record_audio: true,
            microphone: None,
            audio_pre_roll_seconds: 3,
            overlay_path: None,
        }
    }
}

// =============================================================================
// Upload
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadSettings {
    pub api_base: String,
    pub upload_base: String,
    /// Bearer token; falls back to `BOOTH_DRIVE_TOKEN`
    pub access_token: Option<String>,
    pub events_root_id: String,
    pub pooled_root_id: String,
    /// Event folder artifacts are uploaded into
    pub event_folder_id: Option<String>,
    pub share_link_base: String,
    pub qr_size: u32,
    /// Grant anyone-with-the-link read access on new pooled folders
    pub share_publicly: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            access_token: None,
            events_root_id: String::new(),
            pooled_root_id: String::new(),
            event_folder_id: None,
            share_link_base: "https://drive.google.com/drive/folders/".to_string(),
            qr_size: 300,
            share_publicly: false,
        }
    }
}

impl UploadSettings {
    pub fn resolve_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("BOOTH_DRIVE_TOKEN").ok())
    }
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoothSettings {
    pub camera: CameraSettings,
    pub canvas: CanvasSettings,
    pub photo: PhotoSettings,
    pub video: VideoSettings,
    /// No upload section means offline mode
    pub upload: Option<UploadSettings>,
    pub output_dir: PathBuf,
}

impl Default for BoothSettings {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            canvas: CanvasSettings::default(),
            photo: PhotoSettings::default(),
            video: VideoSettings::default(),
            upload: None,
            output_dir: PathBuf::from("photos"),
        }
    }
}
