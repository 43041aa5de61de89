//! Writes presented loss replays to disk for a web presentation layer.
//!
//! Layout: `<dir>/<YYYYMMDD_HHMMSS>_<session>_replay/` holding `001.jpg`,
//! `002.jpg`, ... and a `replay.json` manifest with `data:` URLs.

use std::path::{Path, PathBuf};

use serde::Serialize;
use staring_core::LossCause;
use staring_ui::frame_data_url;
use time::OffsetDateTime;
use tracing::info;

use crate::AppError;
use crate::runtime::LossReplay;

/// Manifest file name inside each replay directory.
pub const MANIFEST_FILE: &str = "replay.json";

/// `replay.json` contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayManifest {
    /// Session the replay belongs to.
    pub session_id: String,
    /// Level that was lost.
    pub level: u32,
    /// Why the level was lost.
    pub cause: LossCause,
    /// First-to-last frame span.
    pub duration_ms: u64,
    /// Frames in capture order.
    pub frames: Vec<ManifestFrame>,
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFrame {
    /// Capture sequence number.
    pub sequence: u64,
    /// Offset from the first frame.
    pub offset_ms: u64,
    /// JPEG file name next to the manifest.
    pub file: String,
    /// Inline `data:image/jpeg;base64,...` URL.
    pub data_url: String,
}

impl ReplayManifest {
    /// Builds the manifest for `replay`.
    pub fn from_replay(replay: &LossReplay) -> Self {
        let frames = replay
            .snapshot
            .frames()
            .iter()
            .enumerate()
            .map(|(index, frame)| ManifestFrame {
                sequence: frame.sequence(),
                offset_ms: replay.snapshot.offset_of(frame).as_millis() as u64,
                file: frame_file_name(index),
                data_url: frame_data_url(frame),
            })
            .collect();

        Self {
            session_id: replay.session_id.clone(),
            level: replay.level,
            cause: replay.cause.clone(),
            duration_ms: replay.snapshot.duration().as_millis() as u64,
            frames,
        }
    }
}

/// Writes `replay` under `dir` and returns the created directory.
///
/// # Errors
/// Returns [`AppError::Export`] when a directory or file cannot be written.
pub fn export_replay(dir: &Path, replay: &LossReplay) -> Result<PathBuf, AppError> {
    let target = dir.join(format!(
        "{}_{}_replay",
        timestamp_compact_utc(),
        replay.session_id
    ));
    std::fs::create_dir_all(&target)
        .map_err(|error| AppError::Export(format!("create {}: {error}", target.display())))?;

    for (index, frame) in replay.snapshot.frames().iter().enumerate() {
        let path = target.join(frame_file_name(index));
        std::fs::write(&path, frame.payload())
            .map_err(|error| AppError::Export(format!("write {}: {error}", path.display())))?;
    }

    let manifest = serde_json::to_vec_pretty(&ReplayManifest::from_replay(replay))
        .map_err(|error| AppError::Export(format!("manifest encode failure: {error}")))?;
    let manifest_path = target.join(MANIFEST_FILE);
    std::fs::write(&manifest_path, manifest)
        .map_err(|error| AppError::Export(format!("write {}: {error}", manifest_path.display())))?;

    info!(
        frames = replay.snapshot.len(),
        path = %target.display(),
        "loss replay exported"
    );
    Ok(target)
}

fn frame_file_name(index: usize) -> String {
    format!("{:03}.jpg", index + 1)
}

fn timestamp_compact_utc() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
