#![warn(missing_docs)]
//! # staring-classifier-contract
//!
//! ## Purpose
//! Defines the inbound classifier message schema and its domain mapping.
//!
//! ## Responsibilities
//! - Parse JSON text messages pushed by the attention classifier.
//! - Map the free-form `status` string onto [`AttentionStatus`].
//! - Reject payloads that do not carry a string `status`.
//!
//! ## Data flow
//! Raw socket text -> [`parse_classification`] -> [`ClassificationEvent`] ->
//! attention monitor.
//!
//! ## Wire format
//! `{"status": "Looked away" | "Distracted" | <anything else>,
//!   "eye_aspect_ratio": <number, optional>}`. Any status other than the two
//! literals means the player is paying attention.
//!
//! ## Error model
//! Invalid JSON, non-object payloads and missing/non-string `status` return
//! [`ContractError`]; callers drop such messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Status literal for a player looking away from the screen.
pub const STATUS_LOOKED_AWAY: &str = "Looked away";
/// Status literal for closed eyes (a blink).
pub const STATUS_DISTRACTED: &str = "Distracted";

/// Domain attention status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttentionStatus {
    /// Player is watching.
    Ok,
    /// Eyes closed for this frame.
    Distracted,
    /// Face missing or gaze off-center.
    LookedAway,
}

impl AttentionStatus {
    /// Maps a wire status string onto the domain status.
    pub fn from_wire(status: &str) -> Self {
        match status {
            STATUS_LOOKED_AWAY => Self::LookedAway,
            STATUS_DISTRACTED => Self::Distracted,
            _ => Self::Ok,
        }
    }
}

/// One classifier verdict for one transmitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationEvent {
    /// Mapped status.
    pub status: AttentionStatus,
    /// Average eye aspect ratio when reported.
    pub eye_aspect_ratio: Option<f64>,
}

impl ClassificationEvent {
    /// Creates an event without auxiliary measurements.
    pub fn new(status: AttentionStatus) -> Self {
        Self {
            status,
            eye_aspect_ratio: None,
        }
    }
}

/// Parses one inbound classifier message.
///
/// # Errors
/// Returns [`ContractError::Decode`] for invalid JSON,
/// [`ContractError::NotAnObject`] for non-object payloads, and
/// [`ContractError::MissingStatus`] when `status` is absent or not a string.
pub fn parse_classification(raw: &str) -> Result<ClassificationEvent, ContractError> {
    let value: Value = serde_json::from_str(raw).map_err(ContractError::Decode)?;
    let Value::Object(message) = value else {
        return Err(ContractError::NotAnObject);
    };

    let Some(status) = message.get("status").and_then(Value::as_str) else {
        return Err(ContractError::MissingStatus {
            error: message
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    };

    Ok(ClassificationEvent {
        status: AttentionStatus::from_wire(status),
        eye_aspect_ratio: message.get("eye_aspect_ratio").and_then(Value::as_f64),
    })
}

/// Classifier contract errors. Every variant means "malformed event".
#[derive(Debug, Error)]
pub enum ContractError {
    /// JSON decode failure.
    #[error("classifier message decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Payload is valid JSON but not an object.
    #[error("classifier message is not a json object")]
    NotAnObject,
    /// Payload has no string `status`.
    #[error("classifier message has no string status")]
    MissingStatus {
        /// The classifier's `error` text, when it sent one instead.
        error: Option<String>,
    },
}
