//! Shared fixtures for app integration tests.

use staring_app::{
    GameConfig, GamePresenter, GameSignal, LossReplay, PlaybackError, PlaybackSurface,
};
use staring_core::Frame;
use staring_session::LevelPlan;
use staring_ui::UiState;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Presenter that records everything it is shown.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingPresenter {
    pub states: Vec<UiState>,
    pub replays: Vec<LossReplay>,
    pub replay_frames: Vec<(u64, usize, usize)>,
    shutdown_when_replay_done: Option<UnboundedSender<GameSignal>>,
}

#[allow(dead_code)]
impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `Shutdown` once a loss replay has been fully presented.
    pub fn shutting_down_after_replay(signals: UnboundedSender<GameSignal>) -> Self {
        Self {
            shutdown_when_replay_done: Some(signals),
            ..Self::default()
        }
    }

    /// Headlines in order, consecutive duplicates collapsed.
    pub fn headlines(&self) -> Vec<String> {
        let mut headlines: Vec<String> = self.states.iter().map(UiState::headline).collect();
        headlines.dedup();
        headlines
    }

    fn finish(&self) {
        if let Some(signals) = &self.shutdown_when_replay_done {
            let _ = signals.send(GameSignal::Shutdown);
        }
    }
}

impl GamePresenter for RecordingPresenter {
    fn session_changed(&mut self, ui: &UiState) {
        self.states.push(ui.clone());
    }

    fn replay_ready(&mut self, replay: &LossReplay) {
        self.replays.push(replay.clone());
        if replay.snapshot.is_empty() {
            self.finish();
        }
    }

    fn replay_frame(&mut self, frame: &Frame, position: usize, total: usize) {
        self.replay_frames.push((frame.sequence(), position, total));
        if position == total {
            self.finish();
        }
    }
}

/// Playback surface driven by the test through explicit signals.
#[allow(dead_code)]
#[derive(Default)]
pub struct ManualPlayback {
    pub played: Vec<(u32, String)>,
    pub stops: usize,
}

impl PlaybackSurface for ManualPlayback {
    fn play(&mut self, level: u32, source: &str) -> Result<(), PlaybackError> {
        self.played.push((level, source.to_string()));
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
    }
}

/// Small, fast configuration for runtime tests.
#[allow(dead_code)]
pub fn fast_config(levels: usize) -> GameConfig {
    GameConfig {
        capture_fps: 20,
        capture_width: 64,
        capture_height: 48,
        loss_replay_delay_ms: 30,
        clip_length_ms: 50,
        connect_timeout_ms: 1_000,
        levels: LevelPlan::new((1..=levels).map(|n| format!("clip-{n}.mp4")).collect())
            .expect("plan should be valid"),
        ..GameConfig::default()
    }
}

/// Channel pre-loaded with `signals`; the sender is dropped so the runtime
/// stops after the last one.
#[allow(dead_code)]
pub fn scripted(signals: Vec<GameSignal>) -> UnboundedReceiver<GameSignal> {
    let (tx, rx) = mpsc::unbounded_channel();
    for signal in signals {
        tx.send(signal).expect("receiver should be alive");
    }
    rx
}

/// Unused-port endpoint that refuses connections.
#[allow(dead_code)]
pub async fn refused_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener should have address");
    drop(listener);
    format!("ws://{address}/ws/video")
}

/// Endpoint that accepts TCP connections and never completes the WebSocket
/// handshake. Abort the handle to release the port.
#[allow(dead_code)]
pub async fn stalled_endpoint() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener should have address");
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (format!("ws://{address}/ws/video"), handle)
}
