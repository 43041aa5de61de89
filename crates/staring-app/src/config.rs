//! Game policy constants and their validated, serde-loadable container.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use staring_capture::{CaptureConfig, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH};
use staring_core::replay_capacity;
use staring_encoder::{DEFAULT_JPEG_QUALITY, EncoderConfig};
use staring_link::{DEFAULT_CONNECT_TIMEOUT, validate_endpoint};
use staring_monitor::DEFAULT_MAX_BLINK_COUNT;
use staring_session::{DEFAULT_LOSS_REPLAY_DELAY, LevelPlan};

use crate::{AppError, CLASSIFIER_URL_ENV, CONFIG_PATH_ENV};

/// Default classifier endpoint.
pub const DEFAULT_CLASSIFIER_ENDPOINT: &str = "ws://localhost:8000/ws/video";
/// Default capture rate.
pub const DEFAULT_CAPTURE_FPS: u32 = 10;
/// Highest accepted capture rate.
pub const MAX_CAPTURE_FPS: u32 = 60;
/// Default replay window.
pub const DEFAULT_REPLAY_WINDOW_SECS: u32 = 5;
/// Longest accepted replay window.
pub const MAX_REPLAY_WINDOW_SECS: u32 = 60;
/// Default length of the placeholder clip.
pub const DEFAULT_CLIP_LENGTH_MS: u64 = 5_000;

/// Game configuration.
///
/// Every field has a default, so a config file only lists overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    /// Capture ticks per second.
    pub capture_fps: u32,
    /// Seconds of footage kept for the loss replay.
    pub replay_window_secs: u32,
    /// JPEG quality in `1..=100`.
    pub jpeg_quality: u8,
    /// Mirror frames before encoding.
    pub mirror_frames: bool,
    /// Distracted verdicts that end a level.
    pub max_blink_count: u32,
    /// Delay before presenting the loss replay.
    pub loss_replay_delay_ms: u64,
    /// Requested camera width.
    pub capture_width: u32,
    /// Requested camera height.
    pub capture_height: u32,
    /// Clip length used by the timed playback surface.
    pub clip_length_ms: u64,
    /// Classifier WebSocket endpoint.
    pub classifier_endpoint: String,
    /// Handshake timeout for the classifier link.
    pub connect_timeout_ms: u64,
    /// Ordered video sources, one per level.
    pub levels: LevelPlan,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            capture_fps: DEFAULT_CAPTURE_FPS,
            replay_window_secs: DEFAULT_REPLAY_WINDOW_SECS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            mirror_frames: true,
            max_blink_count: DEFAULT_MAX_BLINK_COUNT,
            loss_replay_delay_ms: DEFAULT_LOSS_REPLAY_DELAY.as_millis() as u64,
            capture_width: DEFAULT_CAPTURE_WIDTH,
            capture_height: DEFAULT_CAPTURE_HEIGHT,
            clip_length_ms: DEFAULT_CLIP_LENGTH_MS,
            classifier_endpoint: DEFAULT_CLASSIFIER_ENDPOINT.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            levels: LevelPlan::default(),
        }
    }
}

impl GameConfig {
    /// Parses and validates a JSON config document.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for bad JSON, unknown fields or values
    /// that fail [`GameConfig::validate`].
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| AppError::Config(format!("config decode failure: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    /// Returns [`AppError::ConfigIo`] when unreadable, otherwise as
    /// [`GameConfig::from_json`].
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AppError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Builds the effective config from the environment: the file named by
    /// `STARING_CONFIG` (or defaults), then the `STARING_CLASSIFIER_URL`
    /// override.
    ///
    /// # Errors
    /// Propagates load and validation failures.
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path))?,
            _ => Self::default(),
        };

        if let Ok(endpoint) = std::env::var(CLASSIFIER_URL_ENV)
            && !endpoint.trim().is_empty()
        {
            config.classifier_endpoint = endpoint.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks every policy value.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_CAPTURE_FPS).contains(&self.capture_fps) {
            return Err(invalid(format!(
                "capture_fps must be in 1..={MAX_CAPTURE_FPS}, got {}",
                self.capture_fps
            )));
        }
        if !(1..=MAX_REPLAY_WINDOW_SECS).contains(&self.replay_window_secs) {
            return Err(invalid(format!(
                "replay_window_secs must be in 1..={MAX_REPLAY_WINDOW_SECS}, got {}",
                self.replay_window_secs
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(invalid(format!(
                "jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.max_blink_count == 0 {
            return Err(invalid("max_blink_count must be greater than zero"));
        }
        if self.clip_length_ms == 0 {
            return Err(invalid("clip_length_ms must be greater than zero"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms must be greater than zero"));
        }

        self.replay_capacity()?;
        self.capture_config()?;
        validate_endpoint(&self.classifier_endpoint)?;
        Ok(())
    }

    /// Replay buffer capacity (`capture_fps * replay_window_secs`).
    ///
    /// # Errors
    /// Returns [`AppError::Core`] when the product is zero or overflows.
    pub fn replay_capacity(&self) -> Result<usize, AppError> {
        Ok(replay_capacity(self.capture_fps, self.replay_window_secs)?)
    }

    /// Capture cadence and resolution.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] for zero fps or resolution.
    pub fn capture_config(&self) -> Result<CaptureConfig, AppError> {
        Ok(CaptureConfig::new(
            self.capture_fps,
            self.capture_width,
            self.capture_height,
        )?)
    }

    /// Encoder settings.
    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            quality: self.jpeg_quality,
            mirror: self.mirror_frames,
        }
    }

    /// Loss replay delay.
    pub fn loss_replay_delay(&self) -> Duration {
        Duration::from_millis(self.loss_replay_delay_ms)
    }

    /// Placeholder clip length.
    pub fn clip_length(&self) -> Duration {
        Duration::from_millis(self.clip_length_ms)
    }

    /// Classifier handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Config(message.into())
}
