//! Video recording
//!
//! - RecordingChannel trait for the camera and microphone sources
//! - RecordingCoordinator to start, stop and cancel them together
//! - EncodeSink for the streaming video encoder
//! - Finalizer for the mux and overlay passes after recording

pub mod channel;
pub mod coordinator;
pub mod finalize;
pub mod sink;
pub mod state;
pub mod video;

pub use channel::{AudioChannelFactory, ChannelType, RecordingChannel, RecordingError};
pub use coordinator::{RecordingCoordinator, RecordingEvent};
pub use finalize::Finalizer;
pub use sink::{EncodeSink, FfmpegSink, FfmpegSinkFactory, SinkFactory, SinkSpec};
pub use state::{RecordingConfig, RecordingOutput, RecordingSpan, RecordingState};
pub use video::VideoChannel;
