//! Frame pipeline
//!
//! Raw device frames are rotated, fitted to the canvas and mirrored, then
//! split into full-size stills and a downscaled live preview.

pub mod frame;
pub mod glyph;
pub mod preview;
pub mod queue;
pub mod transform;

pub use frame::Frame;
pub use preview::{FramePipeline, PipelineConfig};
pub use transform::{cover, fit_width, letterbox, CanvasSpec, FrameTransform, Rotation};
