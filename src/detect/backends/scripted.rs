use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// One pre-recorded inference outcome.
#[derive(Clone, Debug)]
pub enum ScriptedResult {
    Detections(Vec<Detection>),
    Failure(String),
}

/// Backend that replays a fixed sequence of inference results, one per call.
///
/// Used by tests and the demo daemon in place of a real model. Once the script
/// is exhausted every further call reports no candidates.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: VecDeque<ScriptedResult>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = ScriptedResult>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    /// Convenience constructor: every entry is a successful inference.
    pub fn from_frames(frames: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self::new(frames.into_iter().map(ScriptedResult::Detections))
    }

    /// Number of `infer` calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        log::trace!(
            "scripted inference on frame {} ({} bytes)",
            frame.sequence,
            frame.byte_len()
        );
        match self.script.pop_front() {
            Some(ScriptedResult::Detections(detections)) => Ok(detections),
            Some(ScriptedResult::Failure(reason)) => Err(anyhow!(
                "scripted inference failure on frame {}: {}",
                frame.sequence,
                reason
            )),
            None => Ok(Vec::new()),
        }
    }
}

/// Shape of a synthetic object track for `jittered_track`.
#[derive(Clone, Debug)]
pub struct TrackSpec {
    pub label: String,
    pub frames: usize,
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Maximum per-frame confidence deviation.
    pub confidence_jitter: f32,
    /// Maximum per-frame box offset on each axis.
    pub position_jitter: f32,
}

/// Per-frame detections of one object with seeded noise on confidence and position.
pub fn jittered_track(spec: &TrackSpec, seed: u64) -> Vec<Vec<Detection>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..spec.frames)
        .map(|_| {
            let dc = jitter(&mut rng, spec.confidence_jitter);
            let dx = jitter(&mut rng, spec.position_jitter);
            let dy = jitter(&mut rng, spec.position_jitter);
            let bbox = BoundingBox::new(
                (spec.bbox.x + dx).clamp(0.0, 1.0 - spec.bbox.w),
                (spec.bbox.y + dy).clamp(0.0, 1.0 - spec.bbox.h),
                spec.bbox.w,
                spec.bbox.h,
            );
            vec![Detection::new(
                spec.label.clone(),
                (spec.confidence + dc).clamp(0.0, 1.0),
                bbox,
            )]
        })
        .collect()
}

fn jitter(rng: &mut StdRng, amount: f32) -> f32 {
    if !(amount.is_finite() && amount > 0.0) {
        return 0.0;
    }
    rng.gen_range(-amount..=amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use std::time::Instant;

    #[test]
    fn replays_script_then_reports_nothing() {
        let cat = Detection::new("cat", 0.9, BoundingBox::new(0.4, 0.4, 0.1, 0.1));
        let mut backend = ScriptedBackend::new(vec![
            ScriptedResult::Detections(vec![cat.clone()]),
            ScriptedResult::Failure("camera glitch".into()),
        ]);
        let frame = Frame::blank(7, Instant::now());

        assert_eq!(backend.infer(&frame).unwrap(), vec![cat]);
        let err = backend.infer(&frame).unwrap_err();
        assert!(err.to_string().contains("frame 7"));
        assert!(backend.infer(&frame).unwrap().is_empty());
        assert_eq!(backend.calls(), 3);
        assert_eq!(backend.remaining(), 0);
    }

    #[test]
    fn jittered_track_is_reproducible_and_bounded() {
        let spec = TrackSpec {
            label: "car".into(),
            frames: 12,
            bbox: BoundingBox::new(0.3, 0.3, 0.2, 0.2),
            confidence: 0.88,
            confidence_jitter: 0.03,
            position_jitter: 0.01,
        };
        let a = jittered_track(&spec, 7);
        let b = jittered_track(&spec, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        for frame in &a {
            let d = &frame[0];
            assert!((d.confidence - 0.88).abs() <= 0.03 + 1e-6);
            assert!((d.bbox.x - 0.3).abs() <= 0.01 + 1e-6);
        }
    }

    #[test]
    fn non_finite_jitter_is_ignored() {
        let spec = TrackSpec {
            label: "dog".into(),
            frames: 3,
            bbox: BoundingBox::new(0.3, 0.3, 0.2, 0.2),
            confidence: 0.9,
            confidence_jitter: f32::NAN,
            position_jitter: f32::INFINITY,
        };
        for frame in jittered_track(&spec, 3) {
            assert_eq!(frame[0].confidence, 0.9);
            assert_eq!(frame[0].bbox, spec.bbox);
        }
    }
}
