//! Multi-frame temporal validation.
//!
//! A single static threshold cannot serve both very strong momentary
//! detections and weaker-but-persistent ones, so three independent acceptance
//! paths are evaluated against a sliding history of observations:
//!
//! - fast path: a high-confidence peak backed by a second qualifying frame
//!   within a short window;
//! - consistency path: enough qualifying frames within a medium window;
//! - stability path: the most recent frames are confident on average and their
//!   bounding boxes barely move.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use super::meets;
use super::session::SessionState;
use crate::config::TemporalSettings;
use crate::detect::Detection;

/// One accepted per-frame observation.
#[derive(Clone, Debug, PartialEq)]
pub struct TimestampedDetection {
    pub detection: Detection,
    pub observed_at: Instant,
}

/// Which acceptance path confirmed the detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptanceReason {
    FastPath,
    ConsistencyPath,
    StabilityPath,
}

impl fmt::Display for AcceptanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcceptanceReason::FastPath => "fast path",
            AcceptanceReason::ConsistencyPath => "consistency path",
            AcceptanceReason::StabilityPath => "stability path",
        };
        f.write_str(name)
    }
}

/// Outcome of evaluating one frame's survivors.
///
/// `NoCandidate` (nothing to look at) is kept distinct from `TooSmall` and
/// `NotYet` (something was looked at and not accepted).
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// Session already confirmed or still cooling down; nothing evaluated.
    Skipped,
    NoCandidate,
    /// Every survivor was below the minimum box area.
    TooSmall { confidence: f32, area: f32 },
    NotYet {
        confidence: f32,
        consistent_frames: usize,
        required_frames: usize,
    },
    Accepted {
        detection: Detection,
        reason: AcceptanceReason,
    },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

/// Rolling evidence accumulator. Owns the session history.
#[derive(Clone, Debug)]
pub struct TemporalValidator {
    settings: TemporalSettings,
    history: VecDeque<TimestampedDetection>,
}

impl TemporalValidator {
    pub fn new(settings: TemporalSettings) -> Self {
        Self {
            settings,
            history: VecDeque::new(),
        }
    }

    pub fn history(&self) -> &VecDeque<TimestampedDetection> {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Evaluate the survivors of one frame observed at `now`.
    ///
    /// `survivors` is expected in descending confidence order, as produced by
    /// `OverlapSuppressor`.
    pub fn evaluate(
        &mut self,
        survivors: &[Detection],
        session: &SessionState,
        now: Instant,
    ) -> Verdict {
        if session.has_confirmed {
            return Verdict::Skipped;
        }
        if let Some(last) = session.last_confirmed_at {
            if now.saturating_duration_since(last) < self.settings.cooldown {
                return Verdict::Skipped;
            }
        }

        self.prune(now);

        let Some(strongest) = survivors.first() else {
            return Verdict::NoCandidate;
        };
        let Some(candidate) = survivors
            .iter()
            .filter(|d| d.bbox.area() >= self.settings.minimum_detection_size)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        else {
            return Verdict::TooSmall {
                confidence: strongest.confidence,
                area: strongest.bbox.area(),
            };
        };

        self.history.push_back(TimestampedDetection {
            detection: candidate.clone(),
            observed_at: now,
        });

        if let Some(peak) = self.fast_path(now) {
            return Verdict::Accepted {
                detection: peak,
                reason: AcceptanceReason::FastPath,
            };
        }

        let consistent_frames = self.qualifying_within(now, self.settings.consistency_window);
        if consistent_frames >= self.settings.required_consistent_frames {
            return Verdict::Accepted {
                detection: candidate.clone(),
                reason: AcceptanceReason::ConsistencyPath,
            };
        }

        if self.stability_path(candidate) {
            return Verdict::Accepted {
                detection: candidate.clone(),
                reason: AcceptanceReason::StabilityPath,
            };
        }

        Verdict::NotYet {
            confidence: candidate.confidence,
            consistent_frames,
            required_frames: self.settings.required_consistent_frames,
        }
    }

    /// Mean-distance stability of the most recent `count` entries, in 0..=1.
    ///
    /// `1 - mean(center_distance * scale)` over consecutive pairs, clamped at 0.
    /// Fewer than two entries are trivially stable.
    pub fn stability_score(&self, count: usize) -> f32 {
        let recent: Vec<_> = self.recent(count).collect();
        if recent.len() < 2 {
            return 1.0;
        }
        let total: f32 = recent
            .windows(2)
            .map(|pair| {
                pair[0].detection.bbox.center_distance(&pair[1].detection.bbox)
                    * self.settings.stability_distance_scale
            })
            .sum();
        let mean = total / (recent.len() - 1) as f32;
        (1.0 - mean).max(0.0)
    }

    fn prune(&mut self, now: Instant) {
        let window = self.settings.window;
        while let Some(front) = self.history.front() {
            if now.saturating_duration_since(front.observed_at) > window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn recent(&self, count: usize) -> impl Iterator<Item = &TimestampedDetection> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip)
    }

    fn qualifying(&self, now: Instant, window: Duration) -> impl Iterator<Item = &TimestampedDetection> {
        let floor = self.settings.qualifying_confidence;
        self.history.iter().filter(move |entry| {
            now.saturating_duration_since(entry.observed_at) <= window
                && meets(entry.detection.confidence, floor)
        })
    }

    fn qualifying_within(&self, now: Instant, window: Duration) -> usize {
        self.qualifying(now, window).count()
    }

    fn fast_path(&self, now: Instant) -> Option<Detection> {
        let window = self.settings.fast_path_window;
        if self.qualifying_within(now, window) < self.settings.fast_path_min_frames {
            return None;
        }
        let peak = self
            .qualifying(now, window)
            .max_by(|a, b| a.detection.confidence.total_cmp(&b.detection.confidence))?;
        meets(peak.detection.confidence, self.settings.fast_path_confidence)
            .then(|| peak.detection.clone())
    }

    fn stability_path(&self, current: &Detection) -> bool {
        let required = self.settings.required_consistent_frames;
        if self.history.len() < required {
            return false;
        }
        if !meets(current.confidence, self.settings.stability_current_confidence) {
            return false;
        }
        let mean_confidence = self
            .recent(required)
            .map(|entry| entry.detection.confidence)
            .sum::<f32>()
            / required as f32;
        if !meets(mean_confidence, self.settings.stability_mean_confidence) {
            return false;
        }
        self.stability_score(required) > self.settings.stability_min_score
    }
}
