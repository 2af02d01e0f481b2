use std::fmt;

use super::temporal::{AcceptanceReason, Verdict};

/// Human-readable progress of the current session. Observational only.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Status {
    #[default]
    Idle,
    Searching,
    TooSmall {
        confidence: f32,
    },
    Candidate {
        confidence: f32,
        consistent: usize,
        required: usize,
    },
    Confirmed {
        confidence: f32,
        reason: AcceptanceReason,
    },
}

impl Status {
    /// Status for a non-accepting verdict. `Skipped` leaves the previous status in place.
    pub(crate) fn after(previous: &Status, verdict: &Verdict) -> Status {
        match verdict {
            Verdict::Skipped => previous.clone(),
            Verdict::NoCandidate => Status::Searching,
            Verdict::TooSmall { confidence, .. } => Status::TooSmall {
                confidence: *confidence,
            },
            Verdict::NotYet {
                confidence,
                consistent_frames,
                required_frames,
            } => Status::Candidate {
                confidence: *confidence,
                consistent: *consistent_frames,
                required: *required_frames,
            },
            Verdict::Accepted { detection, reason } => Status::Confirmed {
                confidence: detection.confidence,
                reason: *reason,
            },
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Status::Confirmed { .. })
    }
}

fn percent(confidence: f32) -> u32 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u32
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "waiting for frames"),
            Status::Searching => write!(f, "searching"),
            Status::TooSmall { confidence } => {
                write!(f, "candidate at {}% — too far away", percent(*confidence))
            }
            Status::Candidate {
                confidence,
                consistent,
                required,
            } => write!(
                f,
                "candidate at {}% — needs {} frames ({}/{})",
                percent(*confidence),
                required,
                consistent.min(required),
                required
            ),
            Status::Confirmed { confidence, .. } => {
                write!(f, "confirmed at {}%", percent(*confidence))
            }
        }
    }
}
