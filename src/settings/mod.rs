//! Booth configuration
//!
//! Schema types and the JSON loader. Persisting edited settings belongs to
//! the operator UI and is not handled here.

pub mod schema;
pub mod store;

pub use schema::{
    BoothSettings, CameraSettings, CanvasSettings, PhotoFormat, PhotoSettings, UploadSettings,
    VideoSettings,
};
pub use store::{default_settings_path, load_settings};
