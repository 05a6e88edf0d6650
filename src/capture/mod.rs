//! Camera and microphone capture
//!
//! Device access sits behind the `FrameSource` / `CameraProvider` traits;
//! `webcam` and `audio` are the nokhwa and cpal backends.

pub mod audio;
pub mod device;
pub mod traits;
pub mod webcam;

pub use audio::{list_microphones, MicrophoneChannel, MicrophoneFactory};
pub use device::{CameraDevice, DeviceLease, DeviceOwner};
pub use traits::{AudioDeviceInfo, CameraInfo, CameraProvider, FrameSource};
pub use webcam::{list_cameras, WebcamProvider, WebcamSource};
