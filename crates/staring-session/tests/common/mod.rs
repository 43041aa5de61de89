#![allow(dead_code)]

use std::time::{Duration, Instant};

use staring_core::{Frame, ReplayBuffer};
use staring_monitor::AttentionMonitor;
use staring_session::{LevelPlan, SessionStateMachine};

pub fn machine_with_levels(levels: usize) -> SessionStateMachine {
    let plan = LevelPlan::new((1..=levels).map(|n| format!("clip-{n}.mp4")).collect())
        .expect("plan should be valid");
    let replay = ReplayBuffer::new(50).expect("capacity should be valid");
    SessionStateMachine::new(plan, replay, AttentionMonitor::default())
}

pub fn frames(count: u64) -> Vec<Frame> {
    let origin = Instant::now();
    (1..=count)
        .map(|sequence| {
            Frame::new(
                vec![0xFF, 0xD8, sequence as u8],
                origin + Duration::from_millis(100 * sequence),
                sequence,
            )
        })
        .collect()
}
