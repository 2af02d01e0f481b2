use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detection capability boundary.
///
/// A backend maps one frame to the candidate detections found in it. It is a
/// scarce, serially-reused resource: the pipeline never issues a second `infer`
/// while one is outstanding.
///
/// An `Err` is a transient failure. The pipeline treats it as "no candidates
/// this frame" and never escalates it.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Backends are shared behind a `Mutex` because `infer` takes `&mut self`.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Lock a shared backend, recovering it if a previous `infer` panicked.
///
/// A panic inside `infer` is a failed inference, not a broken backend; the
/// next frame gets a fresh attempt.
pub fn lock_backend(backend: &SharedBackend) -> MutexGuard<'_, dyn DetectorBackend + 'static> {
    backend.lock().unwrap_or_else(|poisoned| {
        log::error!("detection backend panicked during a previous inference; recovering");
        backend.clear_poison();
        poisoned.into_inner()
    })
}
