//! Single-owner pipeline thread.
//!
//! All session mutation happens on one thread that drains a command channel.
//! Frame arrivals and inference completions are both commands, so the two can
//! never race. Inference runs on a short-lived thread per admitted frame and
//! reports back through a `CompletionGuard`, which sends exactly one completion
//! on every exit path (success, error, panic, failed spawn).

use anyhow::{anyhow, Result};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{
    Admission, Confirmation, ConfirmationPipeline, InferenceTicket, Outcome, PipelineSnapshot,
    Status,
};
use crate::config::PipelineConfig;
use crate::detect::{lock_backend, Detection, SharedBackend};
use crate::frame::Frame;

enum Command {
    Frame(Frame),
    Completed {
        ticket: InferenceTicket,
        observed_at: Instant,
        result: Result<Vec<Detection>>,
    },
    SetTarget(String),
    Snapshot(mpsc::Sender<PipelineSnapshot>),
    Shutdown,
}

/// Sends the completion for one admitted frame, at most once.
struct CompletionGuard {
    tx: mpsc::Sender<Command>,
    pending: Option<(InferenceTicket, Instant)>,
}

impl CompletionGuard {
    fn new(tx: mpsc::Sender<Command>, ticket: InferenceTicket, observed_at: Instant) -> Self {
        Self {
            tx,
            pending: Some((ticket, observed_at)),
        }
    }

    fn complete(mut self, result: Result<Vec<Detection>>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<Vec<Detection>>) {
        if let Some((ticket, observed_at)) = self.pending.take() {
            // The owner thread may already be gone during shutdown.
            let _ = self.tx.send(Command::Completed {
                ticket,
                observed_at,
                result,
            });
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.send(Err(anyhow!("inference ended without a result")));
    }
}

/// Handle to a running pipeline thread.
pub struct PipelineHandle {
    tx: mpsc::Sender<Command>,
    join: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Start the owner thread. Confirmations arrive on the returned receiver.
    pub fn spawn(
        config: PipelineConfig,
        backend: SharedBackend,
    ) -> Result<(Self, mpsc::Receiver<Confirmation>)> {
        let pipeline = ConfirmationPipeline::new(config)?;
        let (tx, rx) = mpsc::channel();
        let (confirm_tx, confirm_rx) = mpsc::channel();

        let worker_tx = tx.clone();
        let join = thread::Builder::new()
            .name("confirm-pipeline".to_string())
            .spawn(move || run(pipeline, backend, rx, worker_tx, confirm_tx))
            .map_err(|e| anyhow!("failed to spawn pipeline thread: {}", e))?;

        Ok((
            Self {
                tx,
                join: Some(join),
            },
            confirm_rx,
        ))
    }

    /// Hand a captured frame to the pipeline. Never blocks on inference.
    pub fn submit_frame(&self, frame: Frame) -> Result<()> {
        self.send(Command::Frame(frame))
    }

    /// Change the active target; starts a new session.
    pub fn set_target(&self, category: &str) -> Result<()> {
        self.send(Command::SetTarget(category.to_string()))
    }

    pub fn snapshot(&self) -> Result<PipelineSnapshot> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Snapshot(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("pipeline thread stopped"))
    }

    pub fn status(&self) -> Result<Status> {
        Ok(self.snapshot()?.status)
    }

    /// Wait until no inference is outstanding.
    ///
    /// There is no timeout on inference itself; `timeout` only bounds this wait.
    pub fn wait_idle(&self, timeout: Duration) -> Result<PipelineSnapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.snapshot()?;
            if snapshot.pending_inferences == 0 {
                return Ok(snapshot);
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "pipeline still has {} inference(s) pending after {:?}",
                    snapshot.pending_inferences,
                    timeout
                ));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop the owner thread and wait for it.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        let _ = self.tx.send(Command::Shutdown);
        join.join().map_err(|_| anyhow!("pipeline thread panicked"))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("pipeline thread stopped"))
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("pipeline shutdown failed: {}", e);
        }
    }
}

fn run(
    mut pipeline: ConfirmationPipeline,
    backend: SharedBackend,
    rx: mpsc::Receiver<Command>,
    tx: mpsc::Sender<Command>,
    confirmations: mpsc::Sender<Confirmation>,
) {
    while let Ok(command) = rx.recv() {
        match command {
            Command::Frame(frame) => {
                let admission = pipeline.on_frame(frame.sequence, frame.captured_at);
                if let Admission::Accept(ticket) = admission {
                    dispatch(backend.clone(), frame, ticket, tx.clone());
                }
            }
            Command::Completed {
                ticket,
                observed_at,
                result,
            } => {
                if let Outcome::Confirmed(confirmation) =
                    pipeline.on_completion(ticket, result, observed_at)
                {
                    if confirmations.send(confirmation).is_err() {
                        log::warn!("confirmation receiver dropped; event discarded");
                    }
                }
            }
            Command::SetTarget(category) => pipeline.set_target(&category),
            Command::Snapshot(reply) => {
                let _ = reply.send(pipeline.snapshot());
            }
            Command::Shutdown => break,
        }
    }
    log::debug!("pipeline thread exiting");
}

fn dispatch(
    backend: SharedBackend,
    frame: Frame,
    ticket: InferenceTicket,
    tx: mpsc::Sender<Command>,
) {
    let guard = CompletionGuard::new(tx, ticket, frame.captured_at);
    let spawned = thread::Builder::new()
        .name("confirm-inference".to_string())
        .spawn(move || {
            let result = lock_backend(&backend).infer(&frame);
            guard.complete(result);
        });
    if let Err(e) = spawned {
        // The closure, and the guard inside it, is dropped here; the slot is still released.
        log::error!("failed to spawn inference thread: {}", e);
    }
}
