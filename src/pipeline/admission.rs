use std::time::Instant;

use super::session::SessionState;
use crate::config::AdmissionSettings;

/// Why a frame was not submitted for inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The session already confirmed; no further work needed.
    Confirmed,
    /// The inference budget is exhausted.
    Backpressure,
    /// Not an Nth frame.
    Decimated,
    /// Too soon after the previously admitted frame.
    RateLimited,
}

/// Proof that a frame was admitted. Must be handed back on completion.
#[derive(Debug, PartialEq, Eq)]
pub struct InferenceTicket {
    pub(crate) generation: u64,
    pub(crate) frame_sequence: u64,
}

impl InferenceTicket {
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Accept(InferenceTicket),
    Skip(SkipReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accept(_))
    }
}

/// Rate limiting and backpressure for inference dispatch.
///
/// The only component that touches the scheduling counters of a session.
#[derive(Clone, Debug)]
pub struct FrameAdmissionController {
    settings: AdmissionSettings,
}

impl FrameAdmissionController {
    pub fn new(settings: AdmissionSettings) -> Self {
        Self { settings }
    }

    /// Decide whether the frame arriving at `now` is submitted for inference.
    pub fn admit(&self, session: &mut SessionState, frame_sequence: u64, now: Instant) -> Admission {
        session.frame_counter += 1;

        if session.has_confirmed {
            return Admission::Skip(SkipReason::Confirmed);
        }
        if session.pending_inference_count >= self.settings.max_pending_requests {
            return Admission::Skip(SkipReason::Backpressure);
        }
        if session.frame_counter % self.settings.frame_skip_interval != 0 {
            return Admission::Skip(SkipReason::Decimated);
        }
        if let Some(last) = session.last_frame_processed_at {
            if now.saturating_duration_since(last) < self.settings.min_interval() {
                return Admission::Skip(SkipReason::RateLimited);
            }
        }

        session.pending_inference_count += 1;
        session.last_frame_processed_at = Some(now);
        Admission::Accept(InferenceTicket {
            generation: session.generation,
            frame_sequence,
        })
    }

    /// Release the slot taken by an admitted frame. Called exactly once per ticket.
    pub fn release(&self, session: &mut SessionState, ticket: &InferenceTicket) {
        if session.pending_inference_count == 0 {
            log::warn!(
                "inference slot released twice (frame {}, generation {})",
                ticket.frame_sequence,
                ticket.generation
            );
            return;
        }
        session.pending_inference_count -= 1;
    }
}
