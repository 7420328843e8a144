//! External collaborators consumed by the controller: the frame source and
//! the perception service.

use crate::types::{Descriptor, Detection, EncodedImage, LandmarkError, LandmarkSet, Point};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PerceptionError {
    #[error("perception model unavailable: {0}")]
    Unavailable(String),
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Something that can hand over the most recent camera frame.
pub trait FrameSource: Send {
    /// Current still, or `None` if no frame is ready yet.
    fn current_frame(&mut self) -> Option<EncodedImage>;
}

/// Raw single-face result as returned by a perception backend.
///
/// Not trusted: [`RawDetection::validate`] checks it before the controller
/// looks at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    pub landmarks: Vec<Point>,
    pub descriptor: Vec<f32>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidDetection {
    #[error(transparent)]
    Landmarks(#[from] LandmarkError),
    #[error("descriptor has {actual} values, expected {expected}")]
    DescriptorLength { expected: usize, actual: usize },
}

impl RawDetection {
    pub fn from_landmarks(landmarks: &LandmarkSet, descriptor: Vec<f32>) -> Self {
        Self {
            landmarks: landmarks.points().to_vec(),
            descriptor,
        }
    }

    pub fn validate(self, descriptor_len: usize) -> Result<Detection, InvalidDetection> {
        if self.descriptor.len() != descriptor_len {
            return Err(InvalidDetection::DescriptorLength {
                expected: descriptor_len,
                actual: self.descriptor.len(),
            });
        }
        Ok(Detection {
            landmarks: LandmarkSet::new(self.landmarks)?,
            descriptor: Descriptor::new(self.descriptor),
        })
    }
}

/// Landmark and descriptor extraction for at most one face per frame.
#[async_trait]
pub trait Perception: Send + Sync {
    /// Resolves once the underlying models are loaded.
    async fn ready(&self) -> Result<(), PerceptionError> {
        Ok(())
    }

    /// Detect the most prominent face in `image`, if any.
    async fn detect_single_face(
        &self,
        image: &EncodedImage,
    ) -> Result<Option<RawDetection>, PerceptionError>;
}
