//! Frame sources.
//!
//! Real capture (device cameras, video files) lives outside this crate; a
//! source only has to produce `Frame`s with a sequence number and a capture
//! instant. `SyntheticSource` stands in for a camera in tests and the demo
//! daemon.
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Log frame content

pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticSource, SyntheticStats};
