//! posecap-core: guided head-pose enrollment.
//!
//! Estimates head pose from 68-point landmarks, gates captures on frame-to-frame
//! stillness, and walks a fixed sequence of poses, storing one still and one
//! face descriptor per pose. Face detection and embedding are supplied by the
//! caller through the [`Perception`] trait.

pub mod config;
pub mod controller;
pub mod feedback;
pub mod handoff;
pub mod pose;
pub mod run;
pub mod scheduler;
pub mod source;
pub mod steps;
pub mod stillness;
pub mod types;

pub use config::{ConfigError, EnrollConfig, PoseThresholds};
pub use controller::{CycleOutcome, EnrollmentController, EnrollmentHandle, Status};
pub use feedback::{Feedback, Silent, TerminalBell};
pub use handoff::{EnrollmentRequest, HandoffError};
pub use run::{CaptureRecord, RunSnapshot};
pub use scheduler::{repeat_until_cancelled, LoopHandle};
pub use source::{FrameSource, Perception, PerceptionError, RawDetection};
pub use steps::{PoseRule, Step, StepRegistry};
pub use types::{Descriptor, EncodedImage, LandmarkSet, Point, PoseEstimate};
