#![warn(missing_docs)]
//! # staring-app
//!
//! ## Purpose
//! Wires capture, encoding, the classifier link, attention monitoring and the
//! session state machine into the running staring contest.
//!
//! ## Responsibilities
//! - Load and validate [`GameConfig`].
//! - Run the single-threaded event loop ([`GameRuntime`]).
//! - Open a [`MonitoringScope`] on entering play and close it on every exit.
//! - Drive the playback surface and export loss replays.
//! - Honor the monitoring kill-switch env var.
//!
//! ## Data flow
//! Signals, capture ticks and link events -> [`GameRuntime`] -> session state
//! machine -> effects on the monitoring scope, playback surface and
//! [`GamePresenter`].
//!
//! ## Ownership and lifetimes
//! The runtime owns every live resource. A monitoring scope lives exactly as
//! long as one `playing` state; a pending replay lives until presented or
//! restarted.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Only configuration errors
//! are fatal; runtime failures degrade a UI stage and the game continues.

pub mod commands;
pub mod config;
pub mod playback;
pub mod replay_export;
pub mod runtime;

use std::path::PathBuf;

use rand::RngCore;
use staring_capture::CaptureError;
use staring_core::CoreError;
use staring_encoder::EncodeError;
use staring_link::LinkError;
use staring_monitor::MonitorError;
use staring_session::SessionError;
use thiserror::Error;

pub use commands::parse_command;
pub use config::GameConfig;
pub use playback::{PlaybackError, PlaybackSurface, TimedPlayback};
pub use replay_export::{ReplayManifest, export_replay};
pub use runtime::{
    DialControl, GamePresenter, GameRuntime, GameSignal, LossReplay, MonitoringScope,
};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("STARING_CONTEST_VERSION");

/// Kill-switch env var for attention monitoring.
pub const MONITORING_ENABLED_ENV: &str = "STARING_MONITORING_ENABLED";
/// Env var naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "STARING_CONFIG";
/// Env var overriding the classifier endpoint.
pub const CLASSIFIER_URL_ENV: &str = "STARING_CLASSIFIER_URL";
/// Env var naming the replay export directory.
pub const REPLAY_DIR_ENV: &str = "STARING_REPLAY_DIR";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Checks the monitoring kill-switch.
///
/// Semantics:
/// - Unset => monitoring enabled.
/// - `0`, `false`, `off` (case-insensitive) => monitoring disabled.
/// - Any other value => monitoring enabled.
pub fn monitoring_enabled_from_env() -> bool {
    match std::env::var(MONITORING_ENABLED_ENV) {
        Ok(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off"
        ),
        Err(_) => true,
    }
}

/// Replay export directory from env, if configured.
pub fn replay_dir_from_env() -> Option<PathBuf> {
    std::env::var_os(REPLAY_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Generates a random 64-bit session id as 16 lowercase hex digits.
pub fn new_session_id() -> String {
    let mut bytes = [0_u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Configuration file unreadable.
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Core model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// Capture subsystem error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Encoder error.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    /// Monitor construction error.
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    /// Classifier link error.
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    /// Playback surface error.
    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),
    /// Replay export failure.
    #[error("replay export failed: {0}")]
    Export(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for session ids.

    use super::*;

    #[test]
    fn session_ids_are_sixteen_hex_digits() {
        let id = new_session_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_session_id());
    }
}
