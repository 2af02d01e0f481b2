//! confirmd - live detection confirmation daemon
//!
//! This daemon:
//! 1. Captures frames from a synthetic `stub://` camera
//! 2. Runs a scripted detector that replays a jittered object track
//! 3. Feeds every frame through the confirmation pipeline
//! 4. Prints the confirmation event, if any, and exits

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use detection_confirm::{
    jittered_track, lock_backend, BackendRegistry, BoundingBox, PipelineConfig, PipelineHandle,
    ScriptedBackend, SyntheticConfig, SyntheticSource, TrackSpec,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON or TOML). Defaults to CONFIRM_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Target category; overrides the configured target.
    #[arg(long)]
    target: Option<String>,
    /// Label the synthetic object is reported as.
    #[arg(long, default_value = "car")]
    label: String,
    /// Mean detector confidence of the synthetic object.
    #[arg(long, default_value_t = 0.86)]
    confidence: f32,
    /// Maximum per-frame confidence deviation.
    #[arg(long, default_value_t = 0.04)]
    jitter: f32,
    /// Box size as a fraction of the frame edge.
    #[arg(long, default_value_t = 0.25)]
    size: f32,
    /// Duration of the run in seconds.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Camera frames per second.
    #[arg(long, default_value_t = 15)]
    fps: u32,
    /// Seed for the synthetic track.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::load()?,
    };
    if let Some(target) = &args.target {
        config.target = target.clone();
    }
    if !(0.0..=1.0).contains(&args.size) {
        return Err(anyhow!("--size must be within 0..=1"));
    }
    if !(0.0..=1.0).contains(&args.confidence) {
        return Err(anyhow!("--confidence must be within 0..=1"));
    }
    if !(0.0..=1.0).contains(&args.jitter) {
        return Err(anyhow!("--jitter must be within 0..=1"));
    }

    let total_frames = args.seconds.saturating_mul(u64::from(args.fps));
    let track = jittered_track(
        &TrackSpec {
            label: args.label.clone(),
            frames: usize::try_from(total_frames)?,
            bbox: BoundingBox::new(0.5 - args.size / 2.0, 0.5 - args.size / 2.0, args.size, args.size),
            confidence: args.confidence,
            confidence_jitter: args.jitter,
            position_jitter: 0.01,
        },
        args.seed,
    );

    let mut registry = BackendRegistry::new();
    registry.register(ScriptedBackend::from_frames(track));
    registry.set_default("scripted")?;
    let backend = registry.require_default()?;
    lock_backend(&backend).warm_up()?;
    log::info!("detection backends: {:?}", registry.list());

    let target = config.target.clone();
    let (handle, confirmations) = PipelineHandle::spawn(config, backend)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut source = SyntheticSource::new(SyntheticConfig {
        fps: args.fps,
        ..SyntheticConfig::default()
    })?;
    log::info!(
        "confirmd running: target {}, {} frames at {} fps",
        target,
        total_frames,
        args.fps
    );

    let mut confirmed = None;
    let mut last_report = Instant::now();
    for _ in 0..total_frames {
        if !running.load(Ordering::SeqCst) {
            log::info!("shutdown signal received");
            break;
        }
        let frame = source.next_frame();
        let due = frame.captured_at;
        handle.submit_frame(frame)?;

        match confirmations.recv_timeout(due.saturating_duration_since(Instant::now())) {
            Ok(event) => {
                confirmed = Some(event);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("pipeline thread stopped unexpectedly"));
            }
        }

        if last_report.elapsed() >= Duration::from_secs(2) {
            let snapshot = handle.snapshot()?;
            log::info!("status: {} ({:?})", snapshot.status, snapshot.stats);
            last_report = Instant::now();
        }
    }

    let snapshot = handle.wait_idle(Duration::from_secs(2))?;
    if confirmed.is_none() {
        confirmed = confirmations.try_recv().ok();
    }
    log::info!(
        "source {}: {} frames captured",
        source.stats().name,
        source.stats().frames_captured
    );
    handle.shutdown()?;

    match confirmed {
        Some(event) => println!(
            "confirmed {}: {} at {:.0}% via {} (box {:.2},{:.2} {:.2}x{:.2})",
            event.target,
            event.detection.label,
            event.detection.confidence * 100.0,
            event.reason,
            event.detection.bbox.x,
            event.detection.bbox.y,
            event.detection.bbox.w,
            event.detection.bbox.h
        ),
        None => println!("not confirmed: {}", snapshot.status),
    }
    Ok(())
}
