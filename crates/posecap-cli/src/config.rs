use anyhow::{Context, Result};
use posecap_core::EnrollConfig;
use posecap_hw::DEFAULT_WARMUP_FRAMES;
use std::path::{Path, PathBuf};

/// CLI settings: controller thresholds plus camera selection.
///
/// Thresholds come from an optional TOML file (`--config` or
/// `POSECAP_CONFIG`); `POSECAP_*` environment variables override individual
/// values on top of that.
pub struct Settings {
    pub enroll: EnrollConfig,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width; the driver may negotiate another size.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Frames discarded after each stream start (camera AGC/AE settling).
    pub warmup_frames: usize,
}

impl Settings {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    fn load_with(config_path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| env("POSECAP_CONFIG").map(PathBuf::from));

        let mut enroll = match &path {
            Some(path) => EnrollConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EnrollConfig::default(),
        };

        if let Some(steps) = env("POSECAP_STEPS") {
            enroll.steps = steps
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        enroll.stillness_threshold_px =
            env_parse(&env, "POSECAP_STILLNESS_PX", enroll.stillness_threshold_px);
        enroll.poll_interval_ms = env_parse(&env, "POSECAP_POLL_INTERVAL_MS", enroll.poll_interval_ms);
        let t = &mut enroll.thresholds;
        t.front_max_yaw = env_parse(&env, "POSECAP_FRONT_MAX_YAW", t.front_max_yaw);
        t.front_max_pitch = env_parse(&env, "POSECAP_FRONT_MAX_PITCH", t.front_max_pitch);
        t.turn_min_yaw = env_parse(&env, "POSECAP_TURN_MIN_YAW", t.turn_min_yaw);
        t.up_max_pitch = env_parse(&env, "POSECAP_UP_MAX_PITCH", t.up_max_pitch);
        t.down_min_pitch = env_parse(&env, "POSECAP_DOWN_MIN_PITCH", t.down_min_pitch);

        enroll.validate().context("invalid enrollment settings")?;

        Ok(Self {
            enroll,
            camera_device: env("POSECAP_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            frame_width: env_parse(&env, "POSECAP_FRAME_WIDTH", 720),
            frame_height: env_parse(&env, "POSECAP_FRAME_HEIGHT", 360),
            warmup_frames: env_parse(&env, "POSECAP_WARMUP_FRAMES", DEFAULT_WARMUP_FRAMES),
        })
    }
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match env(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let settings = Settings::load_with(None, env_of(&[])).unwrap();
        assert_eq!(settings.enroll, EnrollConfig::default());
        assert_eq!(settings.camera_device, "/dev/video0");
        assert_eq!((settings.frame_width, settings.frame_height), (720, 360));
        assert_eq!(settings.warmup_frames, DEFAULT_WARMUP_FRAMES);
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::load_with(
            None,
            env_of(&[
                ("POSECAP_STEPS", "front, up ,down"),
                ("POSECAP_STILLNESS_PX", "2.5"),
                ("POSECAP_TURN_MIN_YAW", "10"),
                ("POSECAP_CAMERA_DEVICE", "/dev/video4"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.enroll.steps, vec!["front", "up", "down"]);
        assert_eq!(settings.enroll.stillness_threshold_px, 2.5);
        assert_eq!(settings.enroll.thresholds.turn_min_yaw, 10.0);
        assert_eq!(settings.camera_device, "/dev/video4");
    }

    #[test]
    fn test_env_overrides_pitch_thresholds() {
        let settings = Settings::load_with(
            None,
            env_of(&[
                ("POSECAP_STEPS", "front,up,down"),
                ("POSECAP_UP_MAX_PITCH", "-15"),
                ("POSECAP_DOWN_MIN_PITCH", "25.5"),
                ("POSECAP_WARMUP_FRAMES", "0"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.enroll.thresholds.up_max_pitch, -15.0);
        assert_eq!(settings.enroll.thresholds.down_min_pitch, 25.5);
        assert_eq!(settings.warmup_frames, 0);
    }

    #[test]
    fn test_overlapping_pitch_override_rejected() {
        let result = Settings::load_with(
            None,
            env_of(&[("POSECAP_STEPS", "front,down"), ("POSECAP_DOWN_MIN_PITCH", "5")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        let settings =
            Settings::load_with(None, env_of(&[("POSECAP_POLL_INTERVAL_MS", "soon")])).unwrap();
        assert_eq!(settings.enroll.poll_interval_ms, 16);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = Settings::load_with(None, env_of(&[("POSECAP_STILLNESS_PX", "-1")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = Settings::load_with(
            Some(Path::new("/nonexistent/posecap.toml")),
            env_of(&[]),
        );
        assert!(result.is_err());
    }
}
