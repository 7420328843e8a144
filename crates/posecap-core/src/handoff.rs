//! Packaging a completed run for the enrollment backend.

use crate::run::RunSnapshot;
use crate::types::{Descriptor, EncodedImage, PoseEstimate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum HandoffError {
    #[error("a name is required to enroll a face")]
    BlankName,
    #[error("run is incomplete: {captured} of {required} steps captured")]
    Incomplete { captured: usize, required: usize },
}

/// One step's capture inside a request.
#[derive(Debug, Clone)]
pub struct HandoffCapture {
    pub step: &'static str,
    pub image: EncodedImage,
    pub descriptor: Descriptor,
    pub pose: PoseEstimate,
    pub captured_at: DateTime<Utc>,
}

/// Everything the enrollment API needs to register one person.
#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    pub name: String,
    pub run_id: Uuid,
    pub captures: Vec<HandoffCapture>,
}

impl EnrollmentRequest {
    /// Build a request from a finished run. `name` is trimmed.
    pub fn new(name: &str, snapshot: &RunSnapshot) -> Result<Self, HandoffError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HandoffError::BlankName);
        }
        let incomplete = HandoffError::Incomplete {
            captured: snapshot.captures.len(),
            required: snapshot.step_count,
        };
        let run_id = match snapshot.run_id {
            Some(id) if snapshot.is_complete() && snapshot.captures.len() == snapshot.step_count => id,
            _ => return Err(incomplete),
        };

        Ok(Self {
            name: name.to_string(),
            run_id,
            captures: snapshot
                .captures
                .iter()
                .map(|(step, r)| HandoffCapture {
                    step: *step,
                    image: r.image.clone(),
                    descriptor: r.descriptor.clone(),
                    pose: r.pose,
                    captured_at: r.captured_at,
                })
                .collect(),
        })
    }

    /// Captured stills in step order.
    pub fn images(&self) -> Vec<&EncodedImage> {
        self.captures.iter().map(|c| &c.image).collect()
    }

    /// File name used for capture `index` when the request is written to disk.
    pub fn file_name(&self, index: usize) -> Option<String> {
        self.captures
            .get(index)
            .map(|c| format!("{:02}_{}.{}", index, c.step, c.image.extension()))
    }

    /// Metadata describing the request, with images referenced by file name.
    pub fn manifest(&self) -> Manifest {
        Manifest {
            name: self.name.clone(),
            run_id: self.run_id,
            captures: self
                .captures
                .iter()
                .enumerate()
                .map(|(i, c)| ManifestEntry {
                    step: c.step.to_string(),
                    file: self.file_name(i).unwrap_or_default(),
                    mime: c.image.mime.clone(),
                    yaw: c.pose.yaw,
                    pitch: c.pose.pitch,
                    captured_at: c.captured_at,
                    descriptor: c.descriptor.values.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub name: String,
    pub run_id: Uuid,
    pub captures: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub step: String,
    pub file: String,
    pub mime: String,
    pub yaw: f32,
    pub pitch: f32,
    pub captured_at: DateTime<Utc>,
    pub descriptor: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{CaptureRecord, EnrollmentRun};
    use crate::steps::StepRegistry;

    fn completed_run(registry: &StepRegistry, upto: usize) -> RunSnapshot {
        let mut run = EnrollmentRun::armed(Uuid::new_v4());
        for (i, step) in registry.iter().take(upto).enumerate() {
            run.captures.insert_once(
                step.key,
                CaptureRecord {
                    image: EncodedImage::png(vec![i as u8]),
                    descriptor: Descriptor::new(vec![i as f32; 2]),
                    pose: PoseEstimate { yaw: i as f32, pitch: 0.0 },
                    captured_at: Utc::now(),
                },
            );
        }
        run.current_step_index = upto;
        run.armed = upto < registry.len();
        run.snapshot(registry)
    }

    #[test]
    fn test_complete_run_builds_request() {
        let registry = StepRegistry::default();
        let snap = completed_run(&registry, 3);
        let req = EnrollmentRequest::new("  Ada  ", &snap).unwrap();
        assert_eq!(req.name, "Ada");
        assert_eq!(req.run_id, snap.run_id.unwrap());
        assert_eq!(req.images().len(), 3);
        assert_eq!(req.file_name(1).as_deref(), Some("01_left.png"));
        assert_eq!(req.file_name(3), None);

        let manifest = serde_json::to_value(req.manifest()).unwrap();
        assert_eq!(manifest["name"], "Ada");
        assert_eq!(manifest["captures"][2]["step"], "right");
        assert_eq!(manifest["captures"][2]["file"], "02_right.png");
        assert_eq!(manifest["captures"][0]["descriptor"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_blank_name_rejected() {
        let registry = StepRegistry::default();
        let snap = completed_run(&registry, 3);
        assert_eq!(
            EnrollmentRequest::new("   ", &snap).unwrap_err(),
            HandoffError::BlankName
        );
    }

    #[test]
    fn test_partial_run_rejected() {
        let registry = StepRegistry::default();
        let snap = completed_run(&registry, 2);
        assert_eq!(
            EnrollmentRequest::new("Ada", &snap).unwrap_err(),
            HandoffError::Incomplete { captured: 2, required: 3 }
        );
    }

    #[test]
    fn test_never_started_rejected() {
        let registry = StepRegistry::default();
        let snap = EnrollmentRun::default().snapshot(&registry);
        assert!(matches!(
            EnrollmentRequest::new("Ada", &snap),
            Err(HandoffError::Incomplete { captured: 0, .. })
        ));
    }
}
