//! Live detection confirmation pipeline.
//!
//! Per frame: admission → (detection backend) → semantic filter → overlap
//! suppression → temporal validation → confirmation gate.
//!
//! `ConfirmationPipeline` is the synchronous core. It owns all session state
//! and is driven with explicit instants, so a fixed frame sequence always
//! produces the same result. `PipelineHandle` runs it on a single owner thread
//! and dispatches inference asynchronously.

mod admission;
mod gate;
mod semantics;
mod session;
mod status;
mod suppress;
mod temporal;
mod worker;

pub use admission::{Admission, FrameAdmissionController, InferenceTicket, SkipReason};
pub use gate::ConfirmationGate;
pub use semantics::{CategoryCatalogue, CategoryRule, DetectionFilter, TargetSemantics};
pub use session::SessionState;
pub use status::Status;
pub use suppress::{OverlapSuppressor, DEFAULT_IOU_THRESHOLD};
pub use temporal::{AcceptanceReason, TemporalValidator, TimestampedDetection, Verdict};
pub use worker::PipelineHandle;

use anyhow::Result;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::detect::Detection;

/// Confidence scores derived from f32 sums can land a few ulps under the
/// threshold they were meant to meet.
const CONFIDENCE_TOLERANCE: f32 = 1e-6;

pub(crate) fn meets(value: f32, floor: f32) -> bool {
    value + CONFIDENCE_TOLERANCE >= floor
}

/// The one-shot event emitted when a session confirms.
#[derive(Clone, Debug, PartialEq)]
pub struct Confirmation {
    pub generation: u64,
    pub target: String,
    pub detection: Detection,
    pub reason: AcceptanceReason,
    pub confirmed_at: Instant,
}

/// Counters across the lifetime of a pipeline (not reset with the session).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_admitted: u64,
    pub frames_skipped: u64,
    pub inference_failures: u64,
    pub stale_completions: u64,
    pub gate_rejections: u64,
    pub confirmations: u64,
}

/// Result of handling one inference completion.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Completion belonged to a session that has since been reset.
    Stale,
    Evaluated(Verdict),
    /// Temporal evidence accepted the detection but the final gate did not.
    GateRejected(Detection),
    Confirmed(Confirmation),
}

/// Point-in-time view of the pipeline, for status sinks and tests.
#[derive(Clone, Debug)]
pub struct PipelineSnapshot {
    pub target: String,
    pub generation: u64,
    pub status: Status,
    pub stats: PipelineStats,
    pub pending_inferences: u32,
    pub has_confirmed: bool,
    pub history_len: usize,
}

pub struct ConfirmationPipeline {
    catalogue: CategoryCatalogue,
    semantics: TargetSemantics,
    session: SessionState,
    admission: FrameAdmissionController,
    suppressor: OverlapSuppressor,
    validator: TemporalValidator,
    gate: ConfirmationGate,
    status: Status,
    stats: PipelineStats,
}

impl ConfirmationPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let catalogue = CategoryCatalogue::builtin(config.filter.default_min_confidence)
            .with_rules(&config.filter.categories);
        let semantics = catalogue.resolve(&config.target);
        log::info!(
            "confirmation session started for target {} (generation 0)",
            semantics.name()
        );
        Ok(Self {
            catalogue,
            semantics,
            session: SessionState::new(),
            admission: FrameAdmissionController::new(config.admission),
            suppressor: OverlapSuppressor::default(),
            validator: TemporalValidator::new(config.temporal),
            gate: ConfirmationGate::new(config.gate),
            status: Status::Idle,
            stats: PipelineStats::default(),
        })
    }

    /// Switch the active target. Always starts a new session.
    pub fn set_target(&mut self, category: &str) {
        self.semantics = self.catalogue.resolve(category);
        self.reset();
    }

    /// Discard the current session: history, confirmation latch and counters.
    ///
    /// Completions admitted under the previous generation become no-ops.
    pub fn reset(&mut self) {
        self.session.reset();
        self.validator.clear();
        self.status = Status::Idle;
        log::info!(
            "confirmation session reset for target {} (generation {})",
            self.semantics.name(),
            self.session.generation
        );
    }

    /// Frame arrival. On `Accept` the caller must run inference and hand the
    /// ticket back through `on_completion`, whatever the inference outcome.
    pub fn on_frame(&mut self, frame_sequence: u64, now: Instant) -> Admission {
        self.stats.frames_received += 1;
        let admission = self.admission.admit(&mut self.session, frame_sequence, now);
        match &admission {
            Admission::Accept(_) => {
                self.stats.frames_admitted += 1;
                log::trace!("frame {} admitted", frame_sequence);
            }
            Admission::Skip(reason) => {
                self.stats.frames_skipped += 1;
                log::trace!("frame {} skipped: {:?}", frame_sequence, reason);
            }
        }
        admission
    }

    /// Inference completion for an admitted frame observed at `observed_at`.
    ///
    /// Releases the inference slot exactly once. A failed inference counts as
    /// a frame with no candidates.
    pub fn on_completion(
        &mut self,
        ticket: InferenceTicket,
        result: Result<Vec<Detection>>,
        observed_at: Instant,
    ) -> Outcome {
        self.admission.release(&mut self.session, &ticket);

        if !self.session.is_current(ticket.generation) {
            self.stats.stale_completions += 1;
            log::debug!(
                "ignoring completion for frame {} from generation {} (current {})",
                ticket.frame_sequence,
                ticket.generation,
                self.session.generation
            );
            return Outcome::Stale;
        }

        let candidates = match result {
            Ok(candidates) => candidates,
            Err(e) => {
                self.stats.inference_failures += 1;
                log::warn!("inference failed for frame {}: {}", ticket.frame_sequence, e);
                Vec::new()
            }
        };
        self.process(&candidates, observed_at)
    }

    /// Run filter → suppression → temporal validation → gate on one frame's candidates.
    pub fn process(&mut self, candidates: &[Detection], now: Instant) -> Outcome {
        if self.session.has_confirmed {
            return Outcome::Evaluated(Verdict::Skipped);
        }

        let relevant = DetectionFilter::filter(candidates, &self.semantics);
        let survivors = self.suppressor.suppress(relevant);
        let verdict = self.validator.evaluate(&survivors, &self.session, now);
        log::debug!(
            "target {}: {} candidates, {} survivors, verdict {:?}",
            self.semantics.name(),
            candidates.len(),
            survivors.len(),
            verdict
        );

        let Verdict::Accepted { detection, reason } = verdict else {
            self.status = Status::after(&self.status, &verdict);
            return Outcome::Evaluated(verdict);
        };

        if !self
            .gate
            .confirm(&detection, &self.semantics, &mut self.session, now)
        {
            self.stats.gate_rejections += 1;
            self.status = Status::Searching;
            return Outcome::GateRejected(detection);
        }

        self.stats.confirmations += 1;
        self.status = Status::Confirmed {
            confidence: detection.confidence,
            reason,
        };
        log::info!(
            "confirmed {} for target {} at {:.2} via {}",
            detection.label,
            self.semantics.name(),
            detection.confidence,
            reason
        );
        Outcome::Confirmed(Confirmation {
            generation: self.session.generation,
            target: self.semantics.name().to_string(),
            detection,
            reason,
            confirmed_at: now,
        })
    }

    pub fn semantics(&self) -> &TargetSemantics {
        &self.semantics
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn history(&self) -> &std::collections::VecDeque<TimestampedDetection> {
        self.validator.history()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            target: self.semantics.name().to_string(),
            generation: self.session.generation,
            status: self.status.clone(),
            stats: self.stats.clone(),
            pending_inferences: self.session.pending_inference_count,
            has_confirmed: self.session.has_confirmed,
            history_len: self.validator.history().len(),
        }
    }
}
