//! Frame-to-frame motion gate.

use crate::types::LandmarkSet;

/// Mean landmark displacement in pixels between two consecutive frames.
///
/// Returns `None` when the sets cannot be compared.
pub fn mean_displacement(current: &LandmarkSet, previous: &LandmarkSet) -> Option<f32> {
    let cur = current.points();
    let prev = previous.points();
    if cur.is_empty() || cur.len() != prev.len() {
        return None;
    }
    let total: f32 = cur.iter().zip(prev).map(|(a, b)| a.distance(b)).sum();
    Some(total / cur.len() as f32)
}

/// True if the face moved less than `threshold_px` on average since the
/// previous frame. The first frame after a reset (no previous set) is never
/// considered still.
pub fn is_still(current: &LandmarkSet, previous: Option<&LandmarkSet>, threshold_px: f32) -> bool {
    previous
        .and_then(|prev| mean_displacement(current, prev))
        .is_some_and(|d| d < threshold_px)
}
