use crate::detect::Detection;

/// IoU above which a lower-confidence candidate is treated as a duplicate.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// Non-maximum suppression over one frame's candidates.
#[derive(Clone, Copy, Debug)]
pub struct OverlapSuppressor {
    iou_threshold: f32,
}

impl Default for OverlapSuppressor {
    fn default() -> Self {
        Self::new(DEFAULT_IOU_THRESHOLD)
    }
}

impl OverlapSuppressor {
    pub fn new(iou_threshold: f32) -> Self {
        Self { iou_threshold }
    }

    /// Keep at most one candidate per overlapping cluster, highest confidence first.
    ///
    /// Output is sorted by descending confidence. Ties keep their input order.
    pub fn suppress(&self, mut candidates: Vec<Detection>) -> Vec<Detection> {
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let duplicate = kept
                .iter()
                .any(|k| k.bbox.iou(&candidate.bbox) > self.iou_threshold);
            if duplicate {
                log::trace!(
                    "suppressed {} at {:.2} as duplicate",
                    candidate.label,
                    candidate.confidence
                );
                continue;
            }
            kept.push(candidate);
        }
        kept
    }
}
