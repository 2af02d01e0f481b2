//! Opaque camera frames.
//!
//! The pipeline never looks at pixels. A `Frame` is carried from the frame
//! source to the detection backend and only its metadata (sequence number,
//! capture instant, dimensions) is read by the confirmation stages.
//!
//! Frames are expected to arrive already orientation-corrected.

use std::time::Instant;

/// One captured frame. Pixel data is private to the frame.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,

    /// Capture instant. Used as the observation time of any detection made on this frame.
    pub captured_at: Instant,
}

// Not Clone: a frame is handed to exactly one inference and dropped with it.

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64, captured_at: Instant) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            captured_at,
        }
    }

    /// Empty placeholder frame, for backends that ignore pixel content.
    pub fn blank(sequence: u64, captured_at: Instant) -> Self {
        Self::new(Vec::new(), 0, 0, sequence, captured_at)
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is never logged.
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
