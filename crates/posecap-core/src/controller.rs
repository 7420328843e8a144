//! Guided enrollment controller.
//!
//! A single polling loop pulls a frame, asks the perception service for one
//! face, and walks the step registry: a capture happens only when the run is
//! armed, the face has stopped moving, and the pose satisfies the current
//! step. The loop is started once and stays warm across runs; `start()` on
//! the [`EnrollmentHandle`] only resets the logical run.

use crate::config::{ConfigError, EnrollConfig};
use crate::feedback::Feedback;
use crate::pose::estimate_pose;
use crate::run::{CaptureRecord, EnrollmentRun, RunSnapshot};
use crate::scheduler::{repeat_until_cancelled, LoopHandle};
use crate::source::{FrameSource, Perception, PerceptionError};
use crate::steps::{Step, StepRegistry};
use crate::stillness::is_still;
use crate::types::{Detection, EncodedImage, LandmarkSet, PoseEstimate};
use chrono::Utc;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

/// Human-readable controller state shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Initializing,
    Ready,
    /// Waiting for the given step; carries its key and prompt label.
    Prompt {
        key: &'static str,
        label: &'static str,
    },
    Complete,
    ModelUnavailable(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Initializing => f.write_str("Initializing AI..."),
            Status::Ready => f.write_str("Ready for Enrollment"),
            Status::Prompt { label, .. } => f.write_str(label),
            Status::Complete => f.write_str("Enrollment Complete!"),
            Status::ModelUnavailable(_) => f.write_str("Error loading models"),
        }
    }
}

impl Status {
    fn prompt(step: &Step) -> Self {
        Status::Prompt {
            key: step.key,
            label: step.label,
        }
    }
}

/// What a single detection cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    NoFrame,
    NoFace,
    DetectionFailed,
    /// Face seen while disarmed or after completion.
    Idle { pose: PoseEstimate },
    /// Face still moving into position.
    Moving { pose: PoseEstimate },
    AlreadyCaptured { step: &'static str },
    PoseRejected {
        step: &'static str,
        pose: PoseEstimate,
    },
    Captured {
        step: &'static str,
        index: usize,
        complete: bool,
    },
}

struct ControllerState {
    run: EnrollmentRun,
    /// Landmarks from the previous cycle that produced a face.
    previous: Option<LandmarkSet>,
}

/// State shared between the loop and every [`EnrollmentHandle`].
struct Shared {
    registry: StepRegistry,
    state: Mutex<ControllerState>,
    status: watch::Sender<Status>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, status: Status) {
        self.status.send_replace(status);
    }
}

struct Inner<F, P> {
    shared: Arc<Shared>,
    frames: Mutex<F>,
    perception: P,
    feedback: Box<dyn Feedback>,
    stillness_threshold_px: f32,
    descriptor_len: usize,
}

/// Owns the frame source and perception service and runs detection cycles.
pub struct EnrollmentController<F, P> {
    inner: Arc<Inner<F, P>>,
    poll_interval: std::time::Duration,
}

impl<F, P> EnrollmentController<F, P>
where
    F: FrameSource + 'static,
    P: Perception + 'static,
{
    pub fn new(
        config: &EnrollConfig,
        frames: F,
        perception: P,
        feedback: Box<dyn Feedback>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = StepRegistry::from_config(config)?;
        let (status, _) = watch::channel(Status::Initializing);

        let shared = Arc::new(Shared {
            registry,
            state: Mutex::new(ControllerState {
                run: EnrollmentRun::default(),
                previous: None,
            }),
            status,
        });

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                frames: Mutex::new(frames),
                perception,
                feedback,
                stillness_threshold_px: config.stillness_threshold_px,
                descriptor_len: config.descriptor_len,
            }),
            poll_interval: config.poll_interval(),
        })
    }

    /// Control surface for the host UI. Cheap to clone.
    pub fn handle(&self) -> EnrollmentHandle {
        EnrollmentHandle {
            shared: self.inner.shared.clone(),
        }
    }

    /// Run exactly one detection cycle.
    pub async fn cycle(&self) -> CycleOutcome {
        self.inner.cycle().await
    }

    /// Start the polling loop.
    ///
    /// The first iteration waits for the perception service; if it reports
    /// an error the status becomes [`Status::ModelUnavailable`] and the loop
    /// exits without polling. The loop is cancelled when the returned handle
    /// is dropped.
    pub fn spawn(self) -> LoopHandle {
        let inner = self.inner;
        let mut warmed_up = false;

        repeat_until_cancelled(self.poll_interval, move || {
            let inner = inner.clone();
            let first = !std::mem::replace(&mut warmed_up, true);
            async move {
                if first {
                    if let Err(e) = inner.perception.ready().await {
                        tracing::error!(error = %e, "perception service failed to load");
                        let mut state = inner.shared.lock();
                        state.run.armed = false;
                        inner.shared.publish(Status::ModelUnavailable(e.to_string()));
                        return ControlFlow::Break(());
                    }
                    tracing::info!("perception service ready; detection loop running");
                    inner.shared.status.send_if_modified(|status| {
                        let initializing = *status == Status::Initializing;
                        if initializing {
                            *status = Status::Ready;
                        }
                        initializing
                    });
                }
                inner.cycle().await;
                ControlFlow::Continue(())
            }
        })
    }
}

impl<F, P> Inner<F, P>
where
    F: FrameSource,
    P: Perception,
{
    async fn cycle(&self) -> CycleOutcome {
        let frame = {
            let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
            frames.current_frame()
        };
        let Some(frame) = frame else {
            return CycleOutcome::NoFrame;
        };

        // The only suspension point of a cycle.
        let raw = match self.perception.detect_single_face(&frame).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CycleOutcome::NoFace,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed; skipping cycle");
                return CycleOutcome::DetectionFailed;
            }
        };
        let Detection {
            landmarks,
            descriptor,
        } = match raw.validate(self.descriptor_len) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "discarding malformed detection");
                return CycleOutcome::NoFace;
            }
        };

        let pose = estimate_pose(&landmarks);

        let mut state = self.shared.lock();
        let outcome = self.evaluate(&mut state, &landmarks, pose, || CaptureRecord {
            image: frame,
            descriptor,
            pose,
            captured_at: Utc::now(),
        });
        state.previous = Some(landmarks);
        outcome
    }

    /// Decide whether this cycle captures the current step. Runs under the
    /// state lock.
    fn evaluate(
        &self,
        state: &mut ControllerState,
        landmarks: &LandmarkSet,
        pose: PoseEstimate,
        record: impl FnOnce() -> CaptureRecord,
    ) -> CycleOutcome {
        let registry = &self.shared.registry;
        let index = state.run.current_step_index;

        let step = match registry.get(index) {
            Some(step) if state.run.armed => step,
            _ => return CycleOutcome::Idle { pose },
        };

        if !is_still(landmarks, state.previous.as_ref(), self.stillness_threshold_px) {
            tracing::trace!(step = step.key, "face moving; waiting for stillness");
            return CycleOutcome::Moving { pose };
        }

        if state.run.captures.contains(step.key) {
            return CycleOutcome::AlreadyCaptured { step: step.key };
        }

        tracing::debug!(step = step.key, yaw = pose.yaw, pitch = pose.pitch, "evaluating pose");
        if !step.rule.accepts(&pose) {
            return CycleOutcome::PoseRejected {
                step: step.key,
                pose,
            };
        }

        if !state.run.captures.insert_once(step.key, record()) {
            return CycleOutcome::AlreadyCaptured { step: step.key };
        }
        self.feedback.success(step);
        state.run.current_step_index = index + 1;

        let complete = match registry.get(index + 1) {
            Some(next) => {
                self.shared.publish(Status::prompt(next));
                false
            }
            None => {
                state.run.armed = false;
                self.shared.publish(Status::Complete);
                true
            }
        };

        tracing::info!(
            run_id = ?state.run.run_id,
            step = step.key,
            yaw = pose.yaw,
            pitch = pose.pitch,
            complete,
            "captured step"
        );

        CycleOutcome::Captured {
            step: step.key,
            index,
            complete,
        }
    }
}

/// Cloneable control surface: arms runs and exposes run state.
#[derive(Clone)]
pub struct EnrollmentHandle {
    shared: Arc<Shared>,
}

impl EnrollmentHandle {
    /// Arm a fresh run, discarding any previous captures. Returns the run id.
    ///
    /// Fails without touching the run or the status once the perception
    /// service has failed to load, since no loop is left to serve the run.
    pub fn start(&self) -> Result<Uuid, PerceptionError> {
        let mut state = self.shared.lock();
        if let Status::ModelUnavailable(reason) = &*self.shared.status.borrow() {
            return Err(PerceptionError::Unavailable(reason.clone()));
        }
        let run_id = Uuid::new_v4();
        state.run = EnrollmentRun::armed(run_id);
        state.previous = None;
        if let Some(first) = self.shared.registry.get(0) {
            self.shared.publish(Status::prompt(first));
        }
        tracing::info!(%run_id, steps = self.shared.registry.len(), "enrollment started");
        Ok(run_id)
    }

    pub fn status(&self) -> Status {
        self.shared.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.shared.status.subscribe()
    }

    pub fn is_complete(&self) -> bool {
        self.shared.lock().run.current_step_index >= self.shared.registry.len()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().run.armed
    }

    pub fn current_step_index(&self) -> usize {
        self.shared.lock().run.current_step_index
    }

    pub fn current_step(&self) -> Option<Step> {
        let index = self.current_step_index();
        self.shared.registry.get(index).cloned()
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.shared.registry
    }

    /// Captured stills in step order.
    pub fn captured_images(&self) -> Vec<EncodedImage> {
        self.snapshot().images()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.shared.lock().run.snapshot(&self.shared.registry)
    }
}
