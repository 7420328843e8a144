//! Tunable thresholds for the enrollment controller.
//!
//! The defaults were picked by hand against a 720x360 webcam feed at arm's
//! length. They are starting points, not calibrated biometric limits, and
//! will need retuning for other resolutions or subject distances.

use crate::types::DESCRIPTOR_LEN;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown step key: {0}")]
    UnknownStep(String),
    #[error("step {0} listed more than once")]
    DuplicateStep(String),
    #[error("step sequence is empty")]
    NoSteps,
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("thresholds let one pose satisfy both {first} and {second}: {detail}")]
    OverlappingSteps {
        first: &'static str,
        second: &'static str,
        detail: String,
    },
}

/// Pose thresholds, in the percent-of-face units produced by the estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseThresholds {
    /// Front step: maximum |yaw|.
    pub front_max_yaw: f32,
    /// Front step: maximum |pitch|.
    pub front_max_pitch: f32,
    /// Left step requires yaw above this; right step requires yaw below its negation.
    pub turn_min_yaw: f32,
    /// Up step requires pitch below this.
    pub up_max_pitch: f32,
    /// Down step requires pitch above this.
    pub down_min_pitch: f32,
}

impl Default for PoseThresholds {
    fn default() -> Self {
        Self {
            front_max_yaw: 5.0,
            front_max_pitch: 10.0,
            turn_min_yaw: 7.0,
            up_max_pitch: -10.0,
            down_min_pitch: 20.0,
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollConfig {
    /// Ordered step keys; see [`crate::steps::StepRegistry::from_keys`].
    pub steps: Vec<String>,
    /// Mean landmark displacement (px) below which the face counts as still.
    pub stillness_threshold_px: f32,
    /// Delay between the end of one detection cycle and the start of the next.
    pub poll_interval_ms: u64,
    /// Expected descriptor length; detections with any other length are discarded.
    pub descriptor_len: usize,
    pub thresholds: PoseThresholds,
}

impl Default for EnrollConfig {
    fn default() -> Self {
        Self {
            steps: vec!["front".into(), "left".into(), "right".into()],
            stillness_threshold_px: 1.5,
            poll_interval_ms: 16,
            descriptor_len: DESCRIPTOR_LEN,
            thresholds: PoseThresholds::default(),
        }
    }
}

impl EnrollConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    /// Check values that would make the controller unable to ever capture.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }
        let positive = [
            ("stillness_threshold_px", self.stillness_threshold_px),
            ("thresholds.front_max_yaw", self.thresholds.front_max_yaw),
            ("thresholds.front_max_pitch", self.thresholds.front_max_pitch),
            ("thresholds.turn_min_yaw", self.thresholds.turn_min_yaw),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NotPositive { name, value });
            }
        }
        self.check_disjoint()
    }

    /// Reject thresholds under which one pose satisfies two configured steps
    /// that constrain the same axis.
    fn check_disjoint(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let overlap = |first: &'static str, second: &'static str, detail: String| {
            ConfigError::OverlappingSteps {
                first,
                second,
                detail,
            }
        };

        if self.has_step("front") {
            for turn in ["left", "right"] {
                if self.has_step(turn) && t.front_max_yaw >= t.turn_min_yaw {
                    return Err(overlap(
                        "front",
                        turn,
                        format!(
                            "front_max_yaw {} >= turn_min_yaw {}",
                            t.front_max_yaw, t.turn_min_yaw
                        ),
                    ));
                }
            }
            if self.has_step("up") && t.up_max_pitch > -t.front_max_pitch {
                return Err(overlap(
                    "front",
                    "up",
                    format!(
                        "up_max_pitch {} > -front_max_pitch {}",
                        t.up_max_pitch, -t.front_max_pitch
                    ),
                ));
            }
            if self.has_step("down") && t.down_min_pitch < t.front_max_pitch {
                return Err(overlap(
                    "front",
                    "down",
                    format!(
                        "down_min_pitch {} < front_max_pitch {}",
                        t.down_min_pitch, t.front_max_pitch
                    ),
                ));
            }
        }
        if self.has_step("up") && self.has_step("down") && t.up_max_pitch >= t.down_min_pitch {
            return Err(overlap(
                "up",
                "down",
                format!(
                    "up_max_pitch {} >= down_min_pitch {}",
                    t.up_max_pitch, t.down_min_pitch
                ),
            ));
        }
        Ok(())
    }

    fn has_step(&self, key: &str) -> bool {
        self.steps.iter().any(|s| s == key)
    }
}
