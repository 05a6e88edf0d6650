//! External transcoder
//!
//! Post-processing of recorded video (audio mux, full-frame overlay) runs
//! through an external tool behind the `Transcoder` trait.

pub mod ffmpeg;
pub mod types;

pub use ffmpeg::FfmpegTranscoder;
pub use types::{verify_output, TranscodeJob, Transcoder};
