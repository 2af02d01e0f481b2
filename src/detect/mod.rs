mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{lock_backend, DetectorBackend, SharedBackend};
pub use backends::{jittered_track, ScriptedBackend, ScriptedResult, TrackSpec};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
