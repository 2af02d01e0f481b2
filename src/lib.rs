//! Detection Confirmation Pipeline
//!
//! Turns a stream of noisy per-frame object detections into a single,
//! trustworthy "target found" event for a user-selected category.
//!
//! # Architecture
//!
//! Each admitted frame passes through five stages:
//!
//! 1. **Admission**: backpressure, frame decimation and a rate limit decide
//!    whether a frame is sent to the detection backend at all.
//! 2. **Semantic filter**: candidates whose label is not relevant to the
//!    target, or whose confidence is below the category floor, are dropped.
//! 3. **Overlap suppression**: duplicate boxes for the same object collapse
//!    to the highest-confidence one.
//! 4. **Temporal validation**: a short history of detections must show
//!    consistent evidence (fast path, consistency path or stability path).
//! 5. **Confirmation gate**: a final label and confidence check, then a
//!    one-shot latch. A session confirms at most once.
//!
//! # Module Structure
//!
//! - `frame`: opaque captured frames
//! - `ingest`: frame sources (`stub://` synthetic camera)
//! - `detect`: detection types, backend trait, backend registry
//! - `pipeline`: the confirmation stages, session state, owner thread
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use config::{AdmissionSettings, FilterSettings, GateSettings, PipelineConfig, TemporalSettings};
pub use detect::{
    jittered_track, lock_backend, BackendRegistry, BoundingBox, Detection, DetectorBackend,
    ScriptedBackend, ScriptedResult, SharedBackend, TrackSpec,
};
pub use frame::Frame;
pub use ingest::{SyntheticConfig, SyntheticSource, SyntheticStats};
pub use pipeline::{
    AcceptanceReason, Admission, CategoryCatalogue, CategoryRule, Confirmation,
    ConfirmationPipeline, InferenceTicket, Outcome, PipelineHandle, PipelineSnapshot,
    PipelineStats, SkipReason, Status, TargetSemantics, Verdict,
};
