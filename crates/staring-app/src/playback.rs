//! Video playback surface seam and the fixed-length clip implementation.
//!
//! Surfaces report progress through the runtime's signal channel, tagging
//! every signal with the level it belongs to.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runtime::GameSignal;

/// Renders the level video and reports start, end and failure.
pub trait PlaybackSurface {
    /// Starts playing `source` for `level`, replacing any current clip.
    ///
    /// # Errors
    /// Returns [`PlaybackError`] when the clip cannot start; the runtime
    /// treats this as a playback fault.
    fn play(&mut self, level: u32, source: &str) -> Result<(), PlaybackError>;

    /// Stops the current clip. Idempotent.
    fn stop(&mut self);
}

/// Playback surface errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// Level has no video source.
    #[error("no video source for level {level}")]
    MissingSource {
        /// Level requested.
        level: u32,
    },
    /// Surface-specific failure.
    #[error("playback surface failure: {0}")]
    Surface(String),
}

/// Surface whose clips always run for a fixed length.
#[derive(Debug)]
pub struct TimedPlayback {
    clip_length: Duration,
    signals: UnboundedSender<GameSignal>,
    current: Option<CancellationToken>,
}

impl TimedPlayback {
    /// Creates a surface reporting on `signals`.
    pub fn new(clip_length: Duration, signals: UnboundedSender<GameSignal>) -> Self {
        Self {
            clip_length,
            signals,
            current: None,
        }
    }
}

impl PlaybackSurface for TimedPlayback {
    fn play(&mut self, level: u32, source: &str) -> Result<(), PlaybackError> {
        if source.trim().is_empty() {
            return Err(PlaybackError::MissingSource { level });
        }
        self.stop();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let signals = self.signals.clone();
        let clip_length = self.clip_length;
        debug!(level, source, ?clip_length, "clip started");

        tokio::spawn(async move {
            let _ = signals.send(GameSignal::PlaybackStarted { level });
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(clip_length) => {
                    let _ = signals.send(GameSignal::PlaybackEnded { level });
                    cancelled.cancel();
                }
            }
        });

        self.current = Some(token);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

impl Drop for TimedPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
