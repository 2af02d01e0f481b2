use std::time::Instant;

/// Mutable per-session state. Owned by exactly one `ConfirmationPipeline`.
///
/// The history of observations lives in `TemporalValidator`; everything else
/// a session tracks is here.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    /// Incremented on every reset; completions carry the generation they were admitted under.
    pub generation: u64,
    pub has_confirmed: bool,
    pub last_confirmed_at: Option<Instant>,
    pub last_frame_processed_at: Option<Instant>,
    pub pending_inference_count: u32,
    pub frame_counter: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh session.
    ///
    /// In-flight inferences still occupy the detection capability, so the
    /// pending count carries over; their completions are released but ignored.
    pub fn reset(&mut self) {
        *self = Self {
            generation: self.generation.wrapping_add(1),
            pending_inference_count: self.pending_inference_count,
            ..Self::default()
        };
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}
