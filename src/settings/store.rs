//! Settings loading and validation
//!
//! Settings are read from a JSON file. A missing file yields defaults; values
//! that would stall a session are reset to their defaults and stale asset
//! paths are cleared.

use super::schema::{BoothSettings, PhotoSettings, VideoSettings};
use crate::compose::CollageLayout;
use crate::utils::{BoothError, BoothResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Default settings location: `<config dir>/photobooth/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photobooth")
        .join("settings.json")
}

/// Read settings from `path`, falling back to defaults when absent
pub fn load_settings(path: &Path) -> BoothResult<BoothSettings> {
    if !path.exists() {
        tracing::info!("Settings file {:?} not found, using defaults", path);
        return Ok(BoothSettings::default());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(BoothSettings::default());
    }

    let mut settings: BoothSettings = serde_json::from_str(&content)
        .map_err(|e| BoothError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
    validate(&mut settings);

    tracing::debug!("Loaded settings from {:?}", path);
    Ok(settings)
}

/// Reset out-of-range values and drop asset paths that no longer exist
pub fn validate(settings: &mut BoothSettings) {
    let photo_defaults = PhotoSettings::default();
    let video_defaults = VideoSettings::default();

    if settings.photo.burst_count == 0 {
        settings.photo.burst_count = photo_defaults.burst_count;
    }
    if settings.photo.countdown_seconds == 0 {
        settings.photo.countdown_seconds = photo_defaults.countdown_seconds;
    }
    if settings.video.countdown_seconds == 0 {
        settings.video.countdown_seconds = video_defaults.countdown_seconds;
    }
    if settings.video.duration_seconds == 0 {
        settings.video.duration_seconds = video_defaults.duration_seconds;
    }
    if settings.video.frame_rate == 0 {
        settings.video.frame_rate = video_defaults.frame_rate;
    }
    if settings.canvas.width == 0 || settings.canvas.height == 0 {
        tracing::warn!("Canvas size must be non-zero, restoring defaults");
        settings.canvas = Default::default();
    }

    clear_missing(&mut settings.photo.overlay_path, "photo overlay");
    clear_missing(&mut settings.photo.template_path, "template");
    clear_missing(&mut settings.video.overlay_path, "video overlay");

    // Without a template the burst is laid out as a collage grid
    if settings.photo.template_path.is_none()
        && CollageLayout::for_count(settings.photo.burst_count as usize).is_none()
    {
        tracing::warn!(
            "No collage layout for a burst of {}, using {}",
            settings.photo.burst_count,
            photo_defaults.burst_count
        );
        settings.photo.burst_count = photo_defaults.burst_count;
    }
}

fn clear_missing(path: &mut Option<PathBuf>, what: &str) {
    if let Some(p) = path.as_ref() {
        if !p.exists() {
            tracing::warn!("Configured {} {:?} does not exist, ignoring it", what, p);
            *path = None;
        }
    }
}
