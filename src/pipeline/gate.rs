use std::time::Instant;

use super::meets;
use super::semantics::TargetSemantics;
use super::session::SessionState;
use crate::config::GateSettings;
use crate::detect::Detection;

/// Final, stricter re-check before a session is marked confirmed.
///
/// Repeats the semantic allow-list check with a higher floor than the
/// per-frame filter. A rejection means "still searching", never an error.
#[derive(Clone, Debug)]
pub struct ConfirmationGate {
    settings: GateSettings,
}

impl ConfirmationGate {
    pub fn new(settings: GateSettings) -> Self {
        Self { settings }
    }

    /// Whether `detection` passes the stricter rule set. No side effects.
    pub fn validate(&self, detection: &Detection, semantics: &TargetSemantics) -> bool {
        if !detection.confidence.is_finite() {
            return false;
        }
        match semantics {
            TargetSemantics::Category(rule) => {
                rule.matches_label(&detection.label)
                    && meets(detection.confidence, self.settings.min_confidence)
            }
            TargetSemantics::AnyLabel { .. } => {
                meets(detection.confidence, self.settings.fallback_min_confidence)
            }
        }
    }

    /// Validate and, on success, latch the session as confirmed.
    ///
    /// Returns true at most once per session.
    pub fn confirm(
        &self,
        detection: &Detection,
        semantics: &TargetSemantics,
        session: &mut SessionState,
        now: Instant,
    ) -> bool {
        if session.has_confirmed {
            return false;
        }
        if !self.validate(detection, semantics) {
            log::debug!(
                "gate rejected {} at {:.2} for target {}",
                detection.label,
                detection.confidence,
                semantics.name()
            );
            return false;
        }
        session.has_confirmed = true;
        session.last_confirmed_at = Some(now);
        true
    }
}
