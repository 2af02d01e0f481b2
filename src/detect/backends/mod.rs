pub mod scripted;

pub use scripted::{jittered_track, ScriptedBackend, ScriptedResult, TrackSpec};
