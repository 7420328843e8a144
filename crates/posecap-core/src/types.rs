use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of points in a 68-point facial landmark layout (iBUG 300-W).
pub const LANDMARK_COUNT: usize = 68;

/// Default descriptor length produced by the face recognition network.
pub const DESCRIPTOR_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("expected 68 landmarks, got {0}")]
    WrongCount(usize),
    #[error("landmark {0} has a non-finite coordinate")]
    NonFinite(usize),
}

/// A pixel coordinate within the analysed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A validated 68-point landmark set for one detected face.
///
/// Perception output is untrusted, so construction checks cardinality and
/// rejects NaN or infinite coordinates. Once built, every index used by the
/// pose estimator is guaranteed to exist.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongCount(points.len()));
        }
        if let Some(i) = points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(LandmarkError::NonFinite(i));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Point at a fixed layout index. Every index below 68 exists by construction.
    pub(crate) fn get(&self, index: usize) -> Point {
        self.points[index]
    }

    /// Copy of this set with every point translated by `(dx, dy)`.
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        }
    }
}

/// Identity embedding for one face, compared later by the enrollment backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Opaque encoded still image (PNG, JPEG, ...). Never decoded by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    /// MIME type, e.g. "image/png".
    pub mime: String,
}

impl EncodedImage {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::new(data, "image/png")
    }

    /// File extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

/// A single-face detection as returned by the perception service.
#[derive(Debug, Clone)]
pub struct Detection {
    pub landmarks: LandmarkSet,
    pub descriptor: Descriptor,
}

/// Signed head rotation estimate, roughly 0/0 for a level straight-ahead pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub yaw: f32,
    pub pitch: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<Point> {
        (0..LANDMARK_COUNT)
            .map(|i| Point::new(i as f32, (i * 2) as f32))
            .collect()
    }

    #[test]
    fn test_landmark_set_accepts_68_points() {
        let set = LandmarkSet::new(grid()).unwrap();
        assert_eq!(set.points().len(), LANDMARK_COUNT);
        assert_eq!(set.get(10), Point::new(10.0, 20.0));
    }

    #[test]
    fn test_landmark_set_rejects_wrong_count() {
        let mut points = grid();
        points.pop();
        assert_eq!(
            LandmarkSet::new(points),
            Err(LandmarkError::WrongCount(67))
        );
        assert_eq!(LandmarkSet::new(vec![]), Err(LandmarkError::WrongCount(0)));
    }

    #[test]
    fn test_landmark_set_rejects_nan() {
        let mut points = grid();
        points[5].y = f32::NAN;
        assert_eq!(LandmarkSet::new(points), Err(LandmarkError::NonFinite(5)));
    }

    #[test]
    fn test_translated_moves_every_point() {
        let set = LandmarkSet::new(grid()).unwrap();
        let moved = set.translated(3.0, -4.0);
        for (a, b) in set.points().iter().zip(moved.points()) {
            assert!((a.distance(b) - 5.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_encoded_image_extension() {
        assert_eq!(EncodedImage::png(vec![1]).extension(), "png");
        assert_eq!(EncodedImage::new(vec![], "image/jpeg").extension(), "jpg");
        assert_eq!(EncodedImage::new(vec![], "x/unknown").extension(), "bin");
    }
}
