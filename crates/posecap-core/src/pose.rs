//! Head pose estimation from 68-point facial landmarks.
//!
//! Both angles are ratios of landmark distances rather than absolute pixel
//! measurements, so they do not depend on how large the face is in frame.
//! The values are in "percent of face" units, not degrees.

use crate::types::{LandmarkSet, PoseEstimate};

// --- 68-point landmark indices ---
const CHIN: usize = 8;
const NOSE_BRIDGE: usize = 27;
const NOSE_TIP: usize = 33;
const LEFT_EYE_OUTER: usize = 36;
const RIGHT_EYE_OUTER: usize = 45;

/// Nose-tip drop (as a fraction of bridge-to-chin height) for a level gaze.
const LEVEL_PITCH_RATIO: f32 = 0.35;

/// Estimate yaw and pitch for one face.
///
/// `yaw` is positive when the nose tip is closer to the right outer eye
/// corner than the left one. `pitch` is positive when the head tilts down.
/// A degenerate geometry yields 0 for the affected angle instead of NaN.
pub fn estimate_pose(landmarks: &LandmarkSet) -> PoseEstimate {
    let tip = landmarks.get(NOSE_TIP);

    let d_left = tip.distance(&landmarks.get(LEFT_EYE_OUTER));
    let d_right = tip.distance(&landmarks.get(RIGHT_EYE_OUTER));
    let yaw = ratio(d_left, d_left + d_right)
        .map(|r| (r - 0.5) * 100.0)
        .unwrap_or(0.0);

    let bridge = landmarks.get(NOSE_BRIDGE);
    let face_height = landmarks.get(CHIN).y - bridge.y;
    let pitch = ratio(tip.y - bridge.y, face_height)
        .map(|r| (r - LEVEL_PITCH_RATIO) * 100.0)
        .unwrap_or(0.0);

    PoseEstimate { yaw, pitch }
}

fn ratio(num: f32, denom: f32) -> Option<f32> {
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let r = num / denom;
    r.is_finite().then_some(r)
}
