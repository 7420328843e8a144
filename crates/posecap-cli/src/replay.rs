//! Recorded-session playback.
//!
//! A recording is a JSON-lines file with one object per camera frame:
//!
//! ```text
//! {"image": "frames/0001.png", "face": {"landmarks": [{"x": .., "y": ..}, ...], "descriptor": [...]}}
//! {"image": "frames/0002.png", "face": null}
//! {"image": "frames/0003.png", "error": "inference timeout"}
//! {}
//! ```
//!
//! `image` is resolved relative to the recording; a missing `image` plays as
//! a frame that was not ready. The frame source and the perception stub
//! share one cursor, so each detection answers for the frame just handed out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use posecap_core::{EncodedImage, FrameSource, Perception, PerceptionError, RawDetection};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub face: Option<RawDetection>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Cursor {
    frames: Vec<RecordedFrame>,
    /// Index of the next frame to hand out.
    next: usize,
    /// Frame most recently handed out by the source.
    current: Option<usize>,
}

/// A parsed recording.
pub struct Recording {
    base_dir: PathBuf,
    frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, base_dir)
    }

    pub fn parse(text: &str, base_dir: PathBuf) -> Result<Self> {
        let frames = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<RecordedFrame>(line)
                    .with_context(|| format!("line {}: invalid frame record", i + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { base_dir, frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Split into the frame source, perception stub, and a progress probe.
    pub fn into_parts(self) -> (ReplayFrames, ReplayPerception, ReplayProgress) {
        let cursor = Arc::new(Mutex::new(Cursor {
            frames: self.frames,
            ..Cursor::default()
        }));
        (
            ReplayFrames {
                cursor: cursor.clone(),
                base_dir: self.base_dir,
            },
            ReplayPerception {
                cursor: cursor.clone(),
            },
            ReplayProgress { cursor },
        )
    }
}

fn lock(cursor: &Mutex<Cursor>) -> std::sync::MutexGuard<'_, Cursor> {
    cursor.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ReplayFrames {
    cursor: Arc<Mutex<Cursor>>,
    base_dir: PathBuf,
}

impl FrameSource for ReplayFrames {
    fn current_frame(&mut self) -> Option<EncodedImage> {
        let path = {
            let mut cursor = lock(&self.cursor);
            if cursor.next >= cursor.frames.len() {
                cursor.current = None;
                return None;
            }
            let index = cursor.next;
            cursor.next += 1;
            cursor.current = Some(index);
            cursor.frames[index].image.clone()
        }?;

        let path = self.base_dir.join(path);
        match std::fs::read(&path) {
            Ok(data) => Some(EncodedImage::new(data, mime_for(&path))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "recorded frame unreadable");
                None
            }
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub struct ReplayPerception {
    cursor: Arc<Mutex<Cursor>>,
}

#[async_trait]
impl Perception for ReplayPerception {
    async fn detect_single_face(
        &self,
        _image: &EncodedImage,
    ) -> Result<Option<RawDetection>, PerceptionError> {
        let cursor = lock(&self.cursor);
        let Some(frame) = cursor.current.and_then(|i| cursor.frames.get(i)) else {
            return Ok(None);
        };
        if let Some(err) = &frame.error {
            return Err(PerceptionError::Failed(err.clone()));
        }
        Ok(frame.face.clone())
    }
}

/// Observes how far playback has got.
#[derive(Clone)]
pub struct ReplayProgress {
    cursor: Arc<Mutex<Cursor>>,
}

impl ReplayProgress {
    pub fn played(&self) -> usize {
        lock(&self.cursor).next
    }

    pub fn is_exhausted(&self) -> bool {
        let cursor = lock(&self.cursor);
        cursor.next >= cursor.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posecap_core::{CycleOutcome, EnrollConfig, EnrollmentController, Point, Silent};

    /// 68 landmarks for a face at the given yaw with level pitch.
    fn landmarks(yaw: f32) -> Vec<Point> {
        let mut points: Vec<Point> = (0..68)
            .map(|i| Point::new(100.0 + (i % 10) as f32 * 10.0, 80.0 + (i / 10) as f32 * 30.0))
            .collect();
        points[27] = Point::new(150.0, 100.0);
        points[8] = Point::new(150.0, 300.0);
        points[36] = Point::new(100.0, 170.0);
        points[45] = Point::new(200.0, 170.0);
        points[33] = Point::new(150.0 + yaw, 170.0);
        points
    }

    fn face_line(image: &str, yaw: f32) -> String {
        serde_json::json!({
            "image": image,
            "face": { "landmarks": landmarks(yaw), "descriptor": vec![0.1f32; 128] },
        })
        .to_string()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("posecap-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let text = "{}\n\n{\"error\": \"boom\"}\n";
        let rec = Recording::parse(text, PathBuf::new()).unwrap();
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = Recording::parse("{}\nnot json\n", PathBuf::new()).err().unwrap();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_perception_answers_for_current_frame() {
        let dir = scratch_dir("cursor");
        std::fs::write(dir.join("a.png"), b"a").unwrap();
        let text = [
            face_line("a.png", 0.0),
            r#"{"image": "a.png", "error": "timeout"}"#.to_string(),
            "{}".to_string(),
        ]
        .join("\n");
        let (mut frames, perception, progress) =
            Recording::parse(&text, dir.clone()).unwrap().into_parts();

        let img = frames.current_frame().unwrap();
        assert_eq!(img.data, b"a");
        assert!(perception.detect_single_face(&img).await.unwrap().is_some());

        let img = frames.current_frame().unwrap();
        assert!(perception.detect_single_face(&img).await.is_err());

        // No image: frame not ready.
        assert!(frames.current_frame().is_none());
        assert!(progress.is_exhausted());
        assert_eq!(progress.played(), 3);
        assert!(frames.current_frame().is_none());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_replay_drives_full_enrollment() {
        let dir = scratch_dir("enroll");
        let mut lines = Vec::new();
        for (i, yaw) in [0.0, 0.0, 9.0, -9.0].into_iter().enumerate() {
            let name = format!("{i}.png");
            std::fs::write(dir.join(&name), [i as u8]).unwrap();
            lines.push(face_line(&name, yaw));
        }
        let (frames, perception, progress) =
            Recording::parse(&lines.join("\n"), dir.clone()).unwrap().into_parts();

        let controller =
            EnrollmentController::new(&EnrollConfig::default(), frames, perception, Box::new(Silent))
                .unwrap();
        let handle = controller.handle();
        handle.start().unwrap();

        let mut outcomes = Vec::new();
        while !progress.is_exhausted() {
            outcomes.push(controller.cycle().await);
        }
        assert!(matches!(outcomes[0], CycleOutcome::Moving { .. }));
        assert!(handle.is_complete());
        let images: Vec<_> = handle.captured_images().into_iter().map(|i| i.data).collect();
        assert_eq!(images, vec![vec![1], vec![2], vec![3]]);
        std::fs::remove_dir_all(dir).ok();
    }
}
