use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use detection_confirm::{
    jittered_track, AcceptanceReason, Admission, BoundingBox, ConfirmationPipeline, Detection,
    DetectorBackend, Frame, Outcome, PipelineConfig, PipelineHandle, ScriptedBackend,
    ScriptedResult, SharedBackend, SkipReason, Status, SyntheticConfig, SyntheticSource,
    TrackSpec, Verdict,
};

fn config(target: &str) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.target = target.to_string();
    cfg
}

fn seen(label: &str, confidence: f32) -> Vec<Detection> {
    vec![Detection::new(label, confidence, BoundingBox::new(0.4, 0.4, 0.2, 0.2))]
}

fn at(t0: Instant, millis: u64) -> Instant {
    t0 + Duration::from_millis(millis)
}

#[test]
fn cats_confirm_on_third_frame() {
    let mut p = ConfirmationPipeline::new(config("cats")).unwrap();
    let t0 = Instant::now();

    let first = p.process(&seen("cat", 0.81), t0);
    assert!(matches!(first, Outcome::Evaluated(Verdict::NotYet { .. })));
    assert_eq!(p.status().to_string(), "candidate at 81% — needs 3 frames (1/3)");

    let second = p.process(&seen("cat", 0.83), at(t0, 300));
    assert!(matches!(second, Outcome::Evaluated(Verdict::NotYet { .. })));

    let Outcome::Confirmed(event) = p.process(&seen("cat", 0.82), at(t0, 600)) else {
        panic!("third consistent frame must confirm");
    };
    assert_eq!(event.target, "cats");
    assert_eq!(event.detection.label, "cat");
    assert_eq!(event.reason, AcceptanceReason::ConsistencyPath);
    assert_eq!(event.generation, 0);
    assert_eq!(p.status().to_string(), "confirmed at 82%");
}

#[test]
fn dog_never_confirms_cats() {
    let mut p = ConfirmationPipeline::new(config("cats")).unwrap();
    let t0 = Instant::now();
    for i in 0..10 {
        let outcome = p.process(&seen("dog", 0.95), at(t0, 300 * i));
        assert_eq!(outcome, Outcome::Evaluated(Verdict::NoCandidate));
    }
    assert_eq!(p.status(), &Status::Searching);
    assert!(p.history().is_empty());
}

#[test]
fn motorcycle_never_confirms_bicycles() {
    let mut p = ConfirmationPipeline::new(config("bicycles")).unwrap();
    let t0 = Instant::now();
    for i in 0..5 {
        let outcome = p.process(&seen("motorcycle", 0.9), at(t0, 300 * i));
        assert_eq!(outcome, Outcome::Evaluated(Verdict::NoCandidate));
    }
    assert!(!p.session().has_confirmed);

    p.process(&seen("bicycle", 0.9), at(t0, 1500));
    assert!(matches!(
        p.process(&seen("bicycle", 0.9), at(t0, 1800)),
        Outcome::Confirmed(_)
    ));
}

#[test]
fn single_strong_frame_waits_for_corroboration() {
    let mut p = ConfirmationPipeline::new(config("vehicles")).unwrap();
    let t0 = Instant::now();

    let first = p.process(&seen("car", 0.95), t0);
    assert!(matches!(first, Outcome::Evaluated(Verdict::NotYet { .. })));
    assert!(!p.session().has_confirmed);

    let Outcome::Confirmed(event) = p.process(&seen("truck", 0.82), at(t0, 400)) else {
        panic!("second qualifying frame within the fast window must confirm");
    };
    assert_eq!(event.reason, AcceptanceReason::FastPath);
    assert_eq!(event.detection.label, "car");
    assert_eq!(event.detection.confidence, 0.95);
}

#[test]
fn three_frames_at_threshold_confirm_via_consistency() {
    let mut p = ConfirmationPipeline::new(config("vehicles")).unwrap();
    let t0 = Instant::now();

    p.process(&seen("car", 0.80), t0);
    p.process(&seen("car", 0.80), at(t0, 500));
    let Outcome::Confirmed(event) = p.process(&seen("car", 0.80), at(t0, 1000)) else {
        panic!("three frames at the qualifying floor must confirm");
    };
    assert_eq!(event.reason, AcceptanceReason::ConsistencyPath);
}

#[test]
fn duplicate_boxes_collapse_to_the_strongest() {
    let mut p = ConfirmationPipeline::new(config("vehicles")).unwrap();
    let t0 = Instant::now();

    let frame = vec![
        Detection::new("car", 0.7, BoundingBox::new(0.15, 0.10, 0.2, 0.2)),
        Detection::new("car", 0.9, BoundingBox::new(0.10, 0.10, 0.2, 0.2)),
    ];
    p.process(&frame, t0);
    assert_eq!(p.history().len(), 1);
    assert_eq!(p.history()[0].detection.confidence, 0.9);
}

#[test]
fn distant_object_is_reported_but_never_recorded() {
    let mut p = ConfirmationPipeline::new(config("cats")).unwrap();
    let t0 = Instant::now();

    let tiny = vec![Detection::new("cat", 0.95, BoundingBox::new(0.4, 0.4, 0.1, 0.1))];
    for i in 0..6 {
        let outcome = p.process(&tiny, at(t0, 300 * i));
        assert!(matches!(outcome, Outcome::Evaluated(Verdict::TooSmall { .. })));
    }
    assert!(p.history().is_empty());
    assert!(!p.session().has_confirmed);
    assert_eq!(p.status().to_string(), "candidate at 95% — too far away");
}

#[test]
fn noisy_track_confirms_exactly_once() {
    let mut cfg = config("people");
    cfg.admission.frame_skip_interval = 1;
    let mut p = ConfirmationPipeline::new(cfg).unwrap();
    let track = jittered_track(
        &TrackSpec {
            label: "person".into(),
            frames: 60,
            bbox: BoundingBox::new(0.3, 0.2, 0.2, 0.4),
            confidence: 0.86,
            confidence_jitter: 0.05,
            position_jitter: 0.02,
        },
        42,
    );

    let t0 = Instant::now();
    let mut confirmations = 0;
    for (i, detections) in track.into_iter().enumerate() {
        let now = at(t0, 250 * i as u64);
        let Admission::Accept(ticket) = p.on_frame(i as u64 + 1, now) else {
            continue;
        };
        if let Outcome::Confirmed(_) = p.on_completion(ticket, Ok(detections), now) {
            confirmations += 1;
        }
    }
    assert_eq!(confirmations, 1);
    assert_eq!(p.stats().confirmations, 1);
    assert_eq!(p.session().pending_inference_count, 0);
}

#[test]
fn changing_target_starts_a_fresh_session() {
    let mut cfg = config("cats");
    cfg.admission.frame_skip_interval = 1;
    let mut p = ConfirmationPipeline::new(cfg).unwrap();
    let t0 = Instant::now();

    p.process(&seen("cat", 0.9), t0);
    assert!(matches!(
        p.process(&seen("cat", 0.9), at(t0, 300)),
        Outcome::Confirmed(_)
    ));
    assert_eq!(p.on_frame(1, at(t0, 600)), Admission::Skip(SkipReason::Confirmed));

    p.set_target("dogs");
    assert_eq!(p.semantics().name(), "dogs");
    assert_eq!(p.session().generation, 1);
    assert!(!p.session().has_confirmed);
    assert!(p.history().is_empty());
    assert_eq!(p.status(), &Status::Idle);
    assert!(p.on_frame(2, at(t0, 900)).is_accepted());

    // Evidence gathered for cats does not carry over to the new target.
    let first_dog = p.process(&seen("dog", 0.9), at(t0, 900));
    assert!(matches!(first_dog, Outcome::Evaluated(Verdict::NotYet { .. })));
    for i in 0..3 {
        let outcome = p.process(&seen("cat", 0.95), at(t0, 1000 + 100 * i));
        assert_eq!(outcome, Outcome::Evaluated(Verdict::NoCandidate));
    }
    assert!(!p.session().has_confirmed);

    let Outcome::Confirmed(event) = p.process(&seen("dog", 0.88), at(t0, 1300)) else {
        panic!("second qualifying dog frame must confirm the new target");
    };
    assert_eq!(event.target, "dogs");
    assert_eq!(event.generation, 1);
}

#[test]
fn backpressure_and_rate_limit_hold_back_frames() {
    let mut cfg = config("cats");
    cfg.admission.frame_skip_interval = 1;
    let mut p = ConfirmationPipeline::new(cfg).unwrap();
    let t0 = Instant::now();

    let Admission::Accept(ticket) = p.on_frame(1, t0) else {
        panic!("first frame must be admitted");
    };
    assert_eq!(p.on_frame(2, at(t0, 500)), Admission::Skip(SkipReason::Backpressure));

    p.on_completion(ticket, Ok(Vec::new()), t0);
    // 5 detections per second: 200ms between admitted frames.
    assert_eq!(p.on_frame(3, at(t0, 100)), Admission::Skip(SkipReason::RateLimited));
    assert!(p.on_frame(4, at(t0, 200)).is_accepted());
}

fn shared(backend: &Arc<Mutex<ScriptedBackend>>) -> SharedBackend {
    backend.clone()
}

#[test]
fn handle_confirms_and_emits_a_single_event() {
    let mut cfg = config("cats");
    cfg.admission.frame_skip_interval = 1;
    let backend = Arc::new(Mutex::new(ScriptedBackend::from_frames(
        (0..8).map(|_| seen("cat", 0.9)),
    )));
    let (handle, confirmations) = PipelineHandle::spawn(cfg, shared(&backend)).unwrap();

    let t0 = Instant::now();
    for i in 0..8u64 {
        handle
            .submit_frame(Frame::blank(i + 1, at(t0, 300 * i)))
            .unwrap();
        handle.wait_idle(Duration::from_secs(5)).unwrap();
    }

    let event = confirmations
        .recv_timeout(Duration::from_secs(5))
        .expect("confirmation event");
    assert_eq!(event.target, "cats");
    assert_eq!(event.reason, AcceptanceReason::FastPath);
    assert!(confirmations.try_recv().is_err());

    let snapshot = handle.snapshot().unwrap();
    assert!(snapshot.has_confirmed);
    assert!(snapshot.status.is_confirmed());
    assert_eq!(snapshot.stats.frames_admitted, 2);
    assert_eq!(snapshot.stats.frames_skipped, 6);
    assert_eq!(backend.lock().unwrap().calls(), 2);

    handle.shutdown().unwrap();
}

#[test]
fn handle_decimates_synthetic_camera_frames() {
    // Target dogs never matches the scripted cats, so every admitted frame reaches the backend.
    let backend = Arc::new(Mutex::new(ScriptedBackend::from_frames(
        (0..9).map(|_| seen("cat", 0.9)),
    )));
    let (handle, _confirmations) = PipelineHandle::spawn(config("dogs"), shared(&backend)).unwrap();

    let mut source = SyntheticSource::with_origin(
        SyntheticConfig {
            fps: 3,
            ..SyntheticConfig::default()
        },
        Instant::now(),
    )
    .unwrap();
    for _ in 0..9 {
        handle.submit_frame(source.next_frame()).unwrap();
        handle.wait_idle(Duration::from_secs(5)).unwrap();
    }

    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.stats.frames_received, 9);
    assert_eq!(snapshot.stats.frames_admitted, 3);
    assert_eq!(backend.lock().unwrap().calls(), 3);
    assert_eq!(snapshot.status, Status::Searching);
    assert_eq!(source.stats().frames_captured, 9);
}

#[test]
fn handle_survives_inference_failure() {
    let mut cfg = config("cats");
    cfg.admission.frame_skip_interval = 1;
    let backend = Arc::new(Mutex::new(ScriptedBackend::new([
        ScriptedResult::Failure("accelerator reset".into()),
        ScriptedResult::Detections(seen("cat", 0.9)),
        ScriptedResult::Detections(seen("cat", 0.9)),
    ])));
    let (handle, confirmations) = PipelineHandle::spawn(cfg, shared(&backend)).unwrap();

    let t0 = Instant::now();
    for i in 0..3u64 {
        handle
            .submit_frame(Frame::blank(i + 1, at(t0, 300 * i)))
            .unwrap();
        handle.wait_idle(Duration::from_secs(5)).unwrap();
    }

    assert!(confirmations.recv_timeout(Duration::from_secs(5)).is_ok());
    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.stats.inference_failures, 1);
    assert_eq!(snapshot.pending_inferences, 0);
}

#[test]
fn handle_set_target_resets_session() {
    let mut cfg = config("cats");
    cfg.admission.frame_skip_interval = 1;
    let backend = Arc::new(Mutex::new(ScriptedBackend::from_frames(
        (0..2).map(|_| seen("cat", 0.9)),
    )));
    let (handle, confirmations) = PipelineHandle::spawn(cfg, shared(&backend)).unwrap();

    let t0 = Instant::now();
    for i in 0..2u64 {
        handle
            .submit_frame(Frame::blank(i + 1, at(t0, 300 * i)))
            .unwrap();
        handle.wait_idle(Duration::from_secs(5)).unwrap();
    }
    assert!(confirmations.recv_timeout(Duration::from_secs(5)).is_ok());

    handle.set_target("birds").unwrap();
    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.target, "birds");
    assert_eq!(snapshot.generation, 1);
    assert!(!snapshot.has_confirmed);
    assert_eq!(snapshot.history_len, 0);
    assert_eq!(handle.status().unwrap(), Status::Idle);
}

struct FaultyDriver {
    calls: u64,
}

impl DetectorBackend for FaultyDriver {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn infer(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Detection>> {
        self.calls += 1;
        if self.calls == 1 {
            panic!("driver fault");
        }
        Ok(seen("cat", 0.9))
    }
}

#[test]
fn handle_recovers_after_backend_panic() {
    let mut cfg = config("cats");
    cfg.admission.frame_skip_interval = 1;
    let backend: SharedBackend = Arc::new(Mutex::new(FaultyDriver { calls: 0 }));
    let (handle, confirmations) = PipelineHandle::spawn(cfg, backend).unwrap();

    let t0 = Instant::now();
    for i in 0..3u64 {
        handle.submit_frame(Frame::blank(i + 1, at(t0, 300 * i))).unwrap();
        handle.wait_idle(Duration::from_secs(5)).unwrap();
    }

    let event = confirmations
        .recv_timeout(Duration::from_secs(5))
        .expect("confirmation after the backend recovered");
    assert_eq!(event.detection.label, "cat");
    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.stats.inference_failures, 1);
    assert_eq!(snapshot.pending_inferences, 0);
}
