//! Background capture thread feeding the enrollment loop.
//!
//! The camera stays on its own OS thread with one long-lived stream. Each
//! good frame is PNG-encoded there and parked in a single-slot mailbox; the
//! controller's polling loop takes whatever is newest without ever touching
//! the device.

use crate::camera::{Camera, CameraError};
use posecap_core::{EncodedImage, FrameSource};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Single-slot mailbox holding the newest encoded frame.
///
/// A newer frame replaces an unread one, and each frame is taken at most
/// once so the same still is never evaluated twice.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<EncodedImage>>>,
}

impl LatestFrame {
    pub fn publish(&self, image: EncodedImage) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(image);
    }

    pub fn take(&self) -> Option<EncodedImage> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// A running capture thread. Implements [`FrameSource`].
pub struct CameraFeed {
    latest: LatestFrame,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), CameraError>>>,
}

impl CameraFeed {
    /// Move `camera` onto a dedicated capture thread and start streaming.
    pub fn start(camera: Camera, warmup_frames: usize) -> Result<Self, CameraError> {
        let latest = LatestFrame::default();
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let latest = latest.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("posecap-camera".into())
                .spawn(move || {
                    tracing::info!(device = %camera.device_path, "capture thread started");
                    let result = camera.stream(warmup_frames, |frame| {
                        if stop.load(Ordering::Relaxed) {
                            return ControlFlow::Break(());
                        }
                        if frame.is_dark {
                            tracing::debug!(seq = frame.sequence, "skipping dark frame");
                            return ControlFlow::Continue(());
                        }
                        match frame.encode_png() {
                            Ok(image) => latest.publish(image),
                            Err(e) => tracing::warn!(error = %e, "failed to encode frame"),
                        }
                        ControlFlow::Continue(())
                    });
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "capture thread stopped");
                    }
                    tracing::info!("capture thread exiting");
                    result
                })
                .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?
        };

        Ok(Self {
            latest,
            stop,
            thread: Some(thread),
        })
    }

    /// True while the capture thread is still streaming.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop streaming and wait for the capture thread to exit.
    ///
    /// Returns the error that ended the stream, if any. Blocks for up to one
    /// frame period.
    pub fn stop(mut self) -> Result<(), CameraError> {
        self.stop.store(true, Ordering::Relaxed);
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(CameraError::CaptureFailed("capture thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        // The thread notices on its next frame; it is not joined here.
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl FrameSource for CameraFeed {
    fn current_frame(&mut self) -> Option<EncodedImage> {
        self.latest.take()
    }
}
