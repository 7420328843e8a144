//! Capture confirmation cues. Fire-and-forget: a sink never reports failure.

use crate::steps::Step;
use std::io::Write;

pub trait Feedback: Send + Sync {
    /// Called once per successful capture, after the record is stored.
    fn success(&self, step: &Step);
}

/// No cue.
pub struct Silent;

impl Feedback for Silent {
    fn success(&self, _step: &Step) {}
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl Feedback for TerminalBell {
    fn success(&self, step: &Step) {
        let mut err = std::io::stderr();
        if err.write_all(b"\x07").and_then(|_| err.flush()).is_err() {
            tracing::trace!(step = step.key, "terminal bell unavailable");
        }
    }
}
