//! Per-run enrollment state: armed flag, step cursor, and captured stills.

use crate::steps::StepRegistry;
use crate::types::{Descriptor, EncodedImage, PoseEstimate};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// One captured still for one step. Never mutated once stored.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub image: EncodedImage,
    pub descriptor: Descriptor,
    /// Pose estimate of the frame that satisfied the step.
    pub pose: PoseEstimate,
    pub captured_at: DateTime<Utc>,
}

/// Step key → capture. Grows monotonically within a run.
#[derive(Debug, Clone, Default)]
pub struct CaptureStore {
    records: HashMap<&'static str, CaptureRecord>,
}

impl CaptureStore {
    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&CaptureRecord> {
        self.records.get(key)
    }

    /// Store `record` under `key` unless a record already exists.
    /// Returns false (and leaves the existing record untouched) on a repeat.
    pub fn insert_once(&mut self, key: &'static str, record: CaptureRecord) -> bool {
        match self.records.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Mutable state of the current enrollment run.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentRun {
    /// `None` until the first `start()`.
    pub run_id: Option<Uuid>,
    pub armed: bool,
    pub current_step_index: usize,
    pub captures: CaptureStore,
}

impl EnrollmentRun {
    /// A fresh armed run at step 0 with no captures.
    pub fn armed(run_id: Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            armed: true,
            current_step_index: 0,
            captures: CaptureStore::default(),
        }
    }

    /// Immutable copy with captures listed in step order.
    pub fn snapshot(&self, registry: &StepRegistry) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id,
            armed: self.armed,
            current_step_index: self.current_step_index,
            step_count: registry.len(),
            captures: registry
                .iter()
                .filter_map(|step| {
                    self.captures
                        .get(step.key)
                        .map(|record| (step.key, record.clone()))
                })
                .collect(),
        }
    }
}

/// Point-in-time view of a run handed to callers.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub armed: bool,
    pub current_step_index: usize,
    pub step_count: usize,
    /// `(step key, record)` in step order.
    pub captures: Vec<(&'static str, CaptureRecord)>,
}

impl RunSnapshot {
    pub fn is_complete(&self) -> bool {
        self.current_step_index >= self.step_count
    }

    /// Captured stills in step order.
    pub fn images(&self) -> Vec<EncodedImage> {
        self.captures.iter().map(|(_, r)| r.image.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: u8) -> CaptureRecord {
        CaptureRecord {
            image: EncodedImage::png(vec![tag]),
            descriptor: Descriptor::new(vec![tag as f32; 4]),
            pose: PoseEstimate { yaw: 0.0, pitch: 0.0 },
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_once_keeps_first_record() {
        let mut store = CaptureStore::default();
        assert!(store.insert_once("front", record(1)));
        assert!(!store.insert_once("front", record(2)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("front").unwrap().image.data, vec![1]);
    }

    #[test]
    fn test_snapshot_orders_by_registry_not_insertion() {
        let registry = StepRegistry::default();
        let mut run = EnrollmentRun::armed(Uuid::new_v4());
        run.captures.insert_once("right", record(3));
        run.captures.insert_once("front", record(1));
        run.current_step_index = 2;

        let snap = run.snapshot(&registry);
        let keys: Vec<_> = snap.captures.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["front", "right"]);
        assert_eq!(snap.images()[0].data, vec![1]);
        assert!(!snap.is_complete());
    }

    #[test]
    fn test_default_run_is_idle() {
        let run = EnrollmentRun::default();
        assert!(!run.armed);
        assert!(run.run_id.is_none());
        assert!(run.captures.is_empty());
    }
}
