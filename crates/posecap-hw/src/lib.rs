//! posecap-hw: V4L2 camera frame source for the enrollment controller.
//!
//! Captures grayscale frames on a dedicated thread, drops dark ones, and
//! hands PNG-encoded stills to `posecap-core` through the `FrameSource` trait.

pub mod camera;
pub mod feed;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat, DEFAULT_WARMUP_FRAMES};
pub use feed::{CameraFeed, LatestFrame};
pub use frame::{Frame, FrameError};
