//! Exclusive camera ownership
//!
//! The camera is held by at most one owner at a time: the preview pipeline,
//! or the video recorder. Ownership is a lease that closes the device and
//! frees the slot when dropped, so every exit path releases the camera.

use super::traits::{CameraProvider, FrameSource};
use crate::pipeline::Frame;
use crate::utils::{BoothError, BoothResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceOwner {
    Preview,
    Recorder,
}

pub struct CameraDevice {
    provider: Arc<dyn CameraProvider>,
    owner: Arc<Mutex<Option<DeviceOwner>>>,
}

impl CameraDevice {
    pub fn new(provider: Arc<dyn CameraProvider>) -> Self {
        Self {
            provider,
            owner: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the camera on behalf of `owner`.
    ///
    /// Fails with `DeviceUnavailable` if another owner holds it or the
    /// backend cannot open it.
    pub fn acquire(&self, owner: DeviceOwner) -> BoothResult<DeviceLease> {
        {
            let mut slot = self.owner.lock();
            if let Some(current) = *slot {
                return Err(BoothError::DeviceUnavailable(format!(
                    "Camera is held by {:?}",
                    current
                )));
            }
            *slot = Some(owner);
        }

        match self.provider.open() {
            Ok(source) => {
                tracing::info!("Camera acquired by {:?}", owner);
                Ok(DeviceLease {
                    source,
                    slot: self.owner.clone(),
                    owner,
                })
            }
            Err(e) => {
                *self.owner.lock() = None;
                tracing::error!("Failed to open camera for {:?}: {}", owner, e);
                Err(match e {
                    BoothError::DeviceUnavailable(_) => e,
                    other => BoothError::DeviceUnavailable(other.to_string()),
                })
            }
        }
    }

    pub fn owner(&self) -> Option<DeviceOwner> {
        *self.owner.lock()
    }

    pub fn is_free(&self) -> bool {
        self.owner.lock().is_none()
    }
}

pub struct DeviceLease {
    source: Box<dyn FrameSource>,
    slot: Arc<Mutex<Option<DeviceOwner>>>,
    owner: DeviceOwner,
}

impl DeviceLease {
    pub fn read_frame(&mut self) -> BoothResult<Frame> {
        self.source.read_frame()
    }

    pub fn owner(&self) -> DeviceOwner {
        self.owner
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.source.close();
        *self.slot.lock() = None;
        tracing::info!("Camera released by {:?}", self.owner);
    }
}
