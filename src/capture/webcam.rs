//! Webcam capture using nokhwa
//!
//! The nokhwa camera handle is not `Send`, so it lives on a dedicated
//! thread. `WebcamSource` talks to that thread over channels and is itself
//! `Send`, which lets the preview worker and the recorder move it around.

use super::traits::{CameraInfo, CameraProvider, FrameSource};
use crate::pipeline::Frame;
use crate::utils::{BoothError, BoothResult};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

enum Command {
    Configure { frame_rate: u32, width: u32, height: u32 },
    Read,
    Close,
}

enum Reply {
    Done(BoothResult<()>),
    Frame(BoothResult<Frame>),
}

/// Opens the webcam at a fixed index with the requested mode
pub struct WebcamProvider {
    index: u32,
    frame_rate: u32,
    width: u32,
    height: u32,
}

impl WebcamProvider {
    pub fn new(index: u32, frame_rate: u32, width: u32, height: u32) -> Self {
        Self {
            index,
            frame_rate,
            width,
            height,
        }
    }
}

impl CameraProvider for WebcamProvider {
    fn open(&self) -> BoothResult<Box<dyn FrameSource>> {
        let source = WebcamSource::open(self.index, self.frame_rate, self.width, self.height)?;
        Ok(Box::new(source))
    }
}

pub struct WebcamSource {
    commands: Sender<Command>,
    replies: Receiver<Reply>,
    worker: Option<JoinHandle<()>>,
}

impl WebcamSource {
    pub fn open(index: u32, frame_rate: u32, width: u32, height: u32) -> BoothResult<Self> {
        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (reply_tx, reply_rx) = mpsc::channel::<Reply>();

        let worker = std::thread::Builder::new()
            .name("webcam".to_string())
            .spawn(move || camera_thread(index, frame_rate, width, height, command_rx, reply_tx))?;

        // The thread reports whether the stream opened before serving reads
        match reply_rx.recv() {
            Ok(Reply::Done(Ok(()))) => Ok(Self {
                commands: command_tx,
                replies: reply_rx,
                worker: Some(worker),
            }),
            Ok(Reply::Done(Err(e))) => {
                let _ = worker.join();
                Err(e)
            }
            _ => {
                let _ = worker.join();
                Err(BoothError::DeviceUnavailable(
                    "Camera thread exited during open".to_string(),
                ))
            }
        }
    }

    fn request(&self, command: Command) -> BoothResult<Reply> {
        self.commands
            .send(command)
            .map_err(|_| BoothError::DeviceUnavailable("Camera thread has stopped".to_string()))?;
        self.replies
            .recv()
            .map_err(|_| BoothError::DeviceUnavailable("Camera thread has stopped".to_string()))
    }
}

impl FrameSource for WebcamSource {
    fn configure(&mut self, frame_rate: u32, width: u32, height: u32) -> BoothResult<()> {
        match self.request(Command::Configure {
            frame_rate,
            width,
            height,
        })? {
            Reply::Done(result) => result,
            Reply::Frame(_) => Err(BoothError::InvalidState(
                "Unexpected frame reply to configure".to_string(),
            )),
        }
    }

    fn read_frame(&mut self) -> BoothResult<Frame> {
        match self.request(Command::Read)? {
            Reply::Frame(result) => result,
            Reply::Done(_) => Err(BoothError::ReadFailed(
                "Unexpected reply to read".to_string(),
            )),
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Close);
            let _ = worker.join();
        }
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn camera_thread(
    index: u32,
    frame_rate: u32,
    width: u32,
    height: u32,
    commands: Receiver<Command>,
    replies: Sender<Reply>,
) {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
        CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, frame_rate),
    ));

    let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
        Ok(c) => c,
        Err(e) => {
            let _ = replies.send(Reply::Done(Err(BoothError::DeviceUnavailable(format!(
                "Failed to open camera {}: {:?}",
                index, e
            )))));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = replies.send(Reply::Done(Err(BoothError::DeviceUnavailable(format!(
            "Failed to open camera stream: {:?}",
            e
        )))));
        return;
    }

    let format = camera.camera_format();
    tracing::info!(
        "Webcam {} opened: {}x{} @ {}fps {:?} (requested {}x{} @ {}fps)",
        index,
        format.resolution().width(),
        format.resolution().height(),
        format.frame_rate(),
        format.format(),
        width,
        height,
        frame_rate
    );
    let _ = replies.send(Reply::Done(Ok(())));

    while let Ok(command) = commands.recv() {
        let reply = match command {
            Command::Read => Reply::Frame(read_one(&mut camera)),
            Command::Configure {
                frame_rate,
                width,
                height,
            } => Reply::Done(configure(&mut camera, frame_rate, width, height)),
            Command::Close => break,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
    tracing::debug!("Webcam thread stopped");
}

fn read_one(camera: &mut Camera) -> BoothResult<Frame> {
    let buffer = camera
        .frame()
        .map_err(|e| BoothError::ReadFailed(format!("{:?}", e)))?;
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| BoothError::ReadFailed(format!("Decode failed: {:?}", e)))?;

    // nokhwa may link a different `image` major version; go through raw bytes
    let (w, h) = (decoded.width(), decoded.height());
    let image = RgbImage::from_raw(w, h, decoded.into_raw())
        .ok_or_else(|| BoothError::ReadFailed("Decoded frame has wrong size".to_string()))?;
    Ok(Frame::new(image))
}

fn configure(camera: &mut Camera, frame_rate: u32, width: u32, height: u32) -> BoothResult<()> {
    camera
        .set_resolution(Resolution::new(width, height))
        .map_err(|e| BoothError::DeviceUnavailable(format!("Set resolution: {:?}", e)))?;
    camera
        .set_frame_rate(frame_rate)
        .map_err(|e| BoothError::DeviceUnavailable(format!("Set frame rate: {:?}", e)))?;
    Ok(())
}
