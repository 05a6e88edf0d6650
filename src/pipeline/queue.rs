//! Bounded hand-off between the frame worker and preview consumers
//!
//! When the queue is full the newest frame is rejected and counted. The
//! producer never blocks, and consumers always see frames in read order.

use super::frame::Frame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

/// Preview queue depth
pub const PREVIEW_QUEUE_CAPACITY: usize = 10;

pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameSender {
            tx,
            dropped: dropped.clone(),
        },
        FrameReceiver {
            rx: Mutex::new(rx),
            dropped,
        },
    )
}

pub struct FrameSender {
    tx: SyncSender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Offer a frame; returns false if it was dropped
    pub fn offer(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub struct FrameReceiver {
    rx: Mutex<Receiver<Frame>>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Next queued frame, if any
    pub fn try_next(&self) -> Option<Frame> {
        self.rx.lock().try_recv().ok()
    }

    /// Drain the queue and return only the most recent frame
    pub fn latest(&self) -> Option<Frame> {
        let rx = self.rx.lock();
        let mut last = None;
        while let Ok(frame) = rx.try_recv() {
            last = Some(frame);
        }
        last
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
