#![warn(missing_docs)]
//! # staring-app binary
//!
//! Terminal front end: reads commands from stdin, prints each screen state as
//! one JSON line on stdout, logs to stderr and exports loss replays when
//! `STARING_REPLAY_DIR` is set.

use std::path::PathBuf;
use std::process::ExitCode;

use staring_app::{
    GameConfig, GamePresenter, GameRuntime, GameSignal, LossReplay, TimedPlayback, export_replay,
    monitoring_enabled_from_env, parse_command, replay_dir_from_env,
};
use staring_capture::FrameSourceProvider;
use staring_core::Frame;
use staring_ui::UiState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// CLI entry point.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let config = match GameConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!("failed to load configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    let playback = TimedPlayback::new(config.clip_length(), signals_tx.clone());
    let presenter = TerminalPresenter::new(replay_dir_from_env());

    let mut runtime = match GameRuntime::new(config, frame_source_provider(), presenter, playback) {
        Ok(runtime) => runtime.with_monitoring(monitoring_enabled_from_env()),
        Err(error) => {
            error!("failed to start staring-app: {error}");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(read_commands(signals_tx));
    runtime.run(signals_rx).await;
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "camera")]
fn frame_source_provider() -> Box<dyn FrameSourceProvider> {
    Box::new(staring_capture::CameraProvider::new(0))
}

#[cfg(not(feature = "camera"))]
fn frame_source_provider() -> Box<dyn FrameSourceProvider> {
    info!("built without the `camera` feature; using synthetic frames");
    Box::new(staring_capture::SyntheticProvider::new())
}

async fn read_commands(signals: UnboundedSender<GameSignal>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!("stdin read failed: {error}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(signal) => {
                let shutdown = signal == GameSignal::Shutdown;
                if signals.send(signal).is_err() || shutdown {
                    return;
                }
            }
            Err(message) => warn!("{message}"),
        }
    }
    let _ = signals.send(GameSignal::Shutdown);
}

struct TerminalPresenter {
    replay_dir: Option<PathBuf>,
    last_headline: String,
}

impl TerminalPresenter {
    fn new(replay_dir: Option<PathBuf>) -> Self {
        Self {
            replay_dir,
            last_headline: String::new(),
        }
    }
}

impl GamePresenter for TerminalPresenter {
    fn session_changed(&mut self, ui: &UiState) {
        let headline = ui.headline();
        if headline != self.last_headline {
            info!(level = ui.session.level, "{headline}");
            self.last_headline = headline;
        }
        match serde_json::to_string(ui) {
            Ok(line) => println!("{line}"),
            Err(error) => warn!("ui state encode failure: {error}"),
        }
    }

    fn replay_ready(&mut self, replay: &LossReplay) {
        info!(
            cause = ?replay.cause,
            frames = replay.snapshot.len(),
            duration_ms = replay.snapshot.duration().as_millis() as u64,
            "loss replay ready"
        );
        if let Some(dir) = &self.replay_dir
            && let Err(error) = export_replay(dir, replay)
        {
            warn!("{error}");
        }
    }

    fn replay_frame(&mut self, frame: &Frame, position: usize, total: usize) {
        debug!(sequence = frame.sequence(), bytes = frame.len(), "replay frame {position}/{total}");
    }
}
