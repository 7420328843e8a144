//! The ordered list of head poses an enrollment run must capture.

use crate::config::{ConfigError, EnrollConfig, PoseThresholds};
use crate::types::PoseEstimate;
use std::collections::HashSet;
use std::fmt;

/// Acceptance rule for one step, evaluated against a pose estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseRule {
    /// |yaw| < max_yaw and |pitch| < max_pitch.
    Centered { max_yaw: f32, max_pitch: f32 },
    YawAbove(f32),
    YawBelow(f32),
    PitchAbove(f32),
    PitchBelow(f32),
}

impl PoseRule {
    pub fn accepts(&self, pose: &PoseEstimate) -> bool {
        match *self {
            PoseRule::Centered { max_yaw, max_pitch } => {
                pose.yaw.abs() < max_yaw && pose.pitch.abs() < max_pitch
            }
            PoseRule::YawAbove(min) => pose.yaw > min,
            PoseRule::YawBelow(max) => pose.yaw < max,
            PoseRule::PitchAbove(min) => pose.pitch > min,
            PoseRule::PitchBelow(max) => pose.pitch < max,
        }
    }
}

impl fmt::Display for PoseRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoseRule::Centered { max_yaw, max_pitch } => {
                write!(f, "|yaw| < {max_yaw} and |pitch| < {max_pitch}")
            }
            PoseRule::YawAbove(v) => write!(f, "yaw > {v}"),
            PoseRule::YawBelow(v) => write!(f, "yaw < {v}"),
            PoseRule::PitchAbove(v) => write!(f, "pitch > {v}"),
            PoseRule::PitchBelow(v) => write!(f, "pitch < {v}"),
        }
    }
}

/// One required head pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub key: &'static str,
    /// Prompt shown to the user while this step is pending.
    pub label: &'static str,
    pub icon: &'static str,
    pub rule: PoseRule,
}

impl Step {
    /// Look up a built-in step by key, with thresholds applied.
    pub fn builtin(key: &str, t: &PoseThresholds) -> Option<Step> {
        let (key, label, icon, rule) = match key {
            "front" => (
                "front",
                "Look Straight",
                "👤",
                PoseRule::Centered {
                    max_yaw: t.front_max_yaw,
                    max_pitch: t.front_max_pitch,
                },
            ),
            "left" => ("left", "Turn Left", "⬅️", PoseRule::YawAbove(t.turn_min_yaw)),
            "right" => ("right", "Turn Right", "➡️", PoseRule::YawBelow(-t.turn_min_yaw)),
            "up" => ("up", "Look Up", "⬆️", PoseRule::PitchBelow(t.up_max_pitch)),
            "down" => ("down", "Look Down", "⬇️", PoseRule::PitchAbove(t.down_min_pitch)),
            _ => return None,
        };
        Some(Step { key, label, icon, rule })
    }
}

/// Keys accepted by [`Step::builtin`].
pub const BUILTIN_KEYS: [&str; 5] = ["front", "left", "right", "up", "down"];

/// Immutable ordered step sequence. Order is capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

impl StepRegistry {
    /// Build a registry from step keys, rejecting unknown keys, repeats, and
    /// an empty sequence.
    pub fn from_keys<S: AsRef<str>>(keys: &[S], t: &PoseThresholds) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::NoSteps);
        }
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let step =
                Step::builtin(key, t).ok_or_else(|| ConfigError::UnknownStep(key.to_string()))?;
            if !seen.insert(step.key) {
                return Err(ConfigError::DuplicateStep(key.to_string()));
            }
            steps.push(step);
        }
        Ok(Self { steps })
    }

    pub fn from_config(config: &EnrollConfig) -> Result<Self, ConfigError> {
        Self::from_keys(config.steps.as_slice(), &config.thresholds)
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }
}

impl Default for StepRegistry {
    /// front, left, right with default thresholds.
    fn default() -> Self {
        let t = PoseThresholds::default();
        Self {
            steps: ["front", "left", "right"]
                .iter()
                .filter_map(|k| Step::builtin(k, &t))
                .collect(),
        }
    }
}
