//! Benchmark smoke test for the capture, encode, replay and verdict loop.

use std::time::Instant;

use staring_capture::{FrameSource, SyntheticFrameSource};
use staring_classifier_contract::{AttentionStatus, ClassificationEvent};
use staring_core::{ReplayBuffer, SessionState, replay_capacity};
use staring_encoder::{EncoderConfig, FrameEncoder};
use staring_monitor::AttentionMonitor;
use staring_session::{LevelPlan, SessionStateMachine};

#[test]
fn benchmark_monitoring_loop_smoke_prints_latency() {
    let mut source = SyntheticFrameSource::new(320, 240);
    let encoder = FrameEncoder::new(EncoderConfig::default()).expect("encoder should build");
    let replay = ReplayBuffer::new(replay_capacity(10, 5).expect("capacity should be valid"))
        .expect("buffer should build");
    let plan = LevelPlan::new(vec!["clip-1.mp4".to_string()]).expect("plan should be valid");
    let mut machine = SessionStateMachine::new(plan, replay, AttentionMonitor::default());
    machine.start().expect("game should start");

    let attentive = ClassificationEvent {
        status: AttentionStatus::Ok,
        eye_aspect_ratio: Some(0.31),
    };

    let start = Instant::now();
    let mut encoded_bytes = 0usize;

    for sequence in 1..=100_u64 {
        let raster = source
            .sample()
            .expect("synthetic sample should succeed")
            .expect("synthetic source should have dimensions");
        let frame = encoder
            .encode_frame(&raster, Instant::now(), sequence)
            .expect("frame should encode");
        encoded_bytes += frame.len();
        machine.record_frame(frame);
        assert!(machine.on_classification(&attentive).is_none());
    }

    let elapsed_ms = start.elapsed().as_millis();
    println!("benchmark_monitoring_loop_elapsed_ms={elapsed_ms}");
    println!("benchmark_encoded_bytes_total={encoded_bytes}");

    assert_eq!(machine.session().state, SessionState::Playing);
    assert_eq!(machine.replay().len(), 50);

    // Lightweight guardrail; strict frame-budget checks are environment-specific.
    assert!(
        elapsed_ms < 10_000,
        "monitoring loop smoke benchmark should stay bounded"
    );
}
