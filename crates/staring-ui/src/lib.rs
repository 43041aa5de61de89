#![warn(missing_docs)]
//! # staring-ui
//!
//! ## Purpose
//! Defines the presentation-facing state of the game: dials, replay playback
//! and the projected screen state.
//!
//! ## Responsibilities
//! - Map pointer drags around a dial's center onto a bounded value.
//! - Step through a loss replay one frame at a time.
//! - Project the session and pipeline stages into display text.
//!
//! ## Data flow
//! Pointer events -> [`DialGesture`] -> [`Dial`] value. Session transitions ->
//! [`UiState::apply_session`] -> presenter. Loss snapshot -> [`ReplayPlayer`]
//! -> presenter on each replay tick.
//!
//! ## Ownership and lifetimes
//! A [`DialGesture`] mutably borrows its dial for the length of the drag, so
//! a dial can have at most one live gesture and the gesture cannot outlive
//! it. `UiState` owns all of its values.
//!
//! ## Error model
//! Only dial construction fails ([`UiError`]); every other operation is total.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use staring_core::{Frame, LossCause, ReplaySnapshot, Session, SessionState};
use thiserror::Error;

/// Screen-space point; `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Angle of `pointer` around `center` in `[0, 360)`, with "up" at 0 and
/// clockwise positive.
pub fn pointer_angle(center: Point, pointer: Point) -> f64 {
    let dx = pointer.x - center.x;
    let dy = pointer.y - center.y;
    let degrees = (dy.atan2(dx).to_degrees() + 90.0).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if degrees >= 360.0 { 0.0 } else { degrees }
}

/// Maps an angle onto `[min, max]`, clamped.
pub fn angle_to_value(angle: f64, min: f64, max: f64) -> f64 {
    (min + (angle / 360.0) * (max - min)).clamp(min, max)
}

/// Bounded scalar driven by a circular drag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dial {
    min: f64,
    max: f64,
    value: f64,
    #[serde(skip)]
    dragging: bool,
}

impl Dial {
    /// Creates a dial; `initial` is clamped into range.
    ///
    /// # Errors
    /// Returns [`UiError::InvalidRange`] unless `min < max` and both are
    /// finite.
    pub fn new(min: f64, max: f64, initial: f64) -> Result<Self, UiError> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(UiError::InvalidRange { min, max });
        }
        Ok(Self {
            min,
            max,
            value: initial.clamp(min, max),
            dragging: false,
        })
    }

    /// Volume preset: `[0, 1]`, starting at half.
    pub fn volume() -> Self {
        Self::preset(0.0, 1.0, 0.5)
    }

    /// Brightness preset: `[0.2, 1.2]`, starting at full.
    pub fn brightness() -> Self {
        Self::preset(0.2, 1.2, 1.0)
    }

    fn preset(min: f64, max: f64, value: f64) -> Self {
        Self {
            min,
            max,
            value,
            dragging: false,
        }
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Lower bound.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns `true` while a gesture holds the dial.
    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Display rotation in degrees for the current value.
    pub fn rotation_degrees(&self) -> f64 {
        (self.value - self.min) / (self.max - self.min) * 360.0
    }

    /// Starts a drag anchored at the dial's on-screen `center`.
    pub fn begin_drag(&mut self, center: Point) -> DialGesture<'_> {
        self.dragging = true;
        DialGesture { dial: self, center }
    }
}

/// One live drag. Dropping it ends the gesture.
#[derive(Debug)]
pub struct DialGesture<'a> {
    dial: &'a mut Dial,
    center: Point,
}

impl DialGesture<'_> {
    /// Applies a pointer move and returns the new value.
    pub fn pointer_moved(&mut self, pointer: Point) -> f64 {
        let angle = pointer_angle(self.center, pointer);
        self.dial.value = angle_to_value(angle, self.dial.min, self.dial.max);
        self.dial.value
    }

    /// Ends the gesture and returns the final value.
    pub fn release(self) -> f64 {
        self.dial.value
    }
}

impl Drop for DialGesture<'_> {
    fn drop(&mut self) {
        self.dial.dragging = false;
    }
}

/// Steps through a loss replay in capture order.
#[derive(Debug, Clone)]
pub struct ReplayPlayer {
    snapshot: ReplaySnapshot,
    cursor: usize,
}

impl ReplayPlayer {
    /// Creates a player positioned before the first frame.
    pub fn new(snapshot: ReplaySnapshot) -> Self {
        Self {
            snapshot,
            cursor: 0,
        }
    }

    /// Snapshot being played.
    pub fn snapshot(&self) -> &ReplaySnapshot {
        &self.snapshot
    }

    /// Returns the next frame, or `None` once every frame was shown.
    pub fn advance(&mut self) -> Option<&Frame> {
        let frame = self.snapshot.frames().get(self.cursor)?;
        self.cursor += 1;
        Some(frame)
    }

    /// Frames already shown.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Returns `true` after the last frame.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.snapshot.len()
    }
}

/// Encodes a JPEG frame as a `data:` URL for web presentation.
pub fn frame_data_url(frame: &Frame) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(frame.payload()))
}

/// Pipeline stage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StageStatus {
    /// Stage not started.
    Idle,
    /// Stage starting.
    Running,
    /// Stage working.
    Healthy,
    /// Stage failed non-fatally; the game continues without it.
    Degraded,
}

/// Aggregate screen state handed to the presenter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// App version from the root `VERSION` file.
    pub version: String,
    /// Session projection.
    pub session: Session,
    /// Number of configured levels.
    pub level_count: u32,
    /// Camera stage.
    pub camera: StageStatus,
    /// Classifier link stage.
    pub link: StageStatus,
    /// Cause of the last loss while `lost`.
    pub loss_cause: Option<LossCause>,
    /// Volume control.
    pub volume: Dial,
    /// Brightness control.
    pub brightness: Dial,
}

impl UiState {
    /// Creates the idle screen state.
    pub fn new(version: impl Into<String>, level_count: u32) -> Self {
        Self {
            version: version.into(),
            session: Session::new(),
            level_count,
            camera: StageStatus::Idle,
            link: StageStatus::Idle,
            loss_cause: None,
            volume: Dial::volume(),
            brightness: Dial::brightness(),
        }
    }

    /// Copies the session and clears stale loss details.
    pub fn apply_session(&mut self, session: &Session, loss_cause: Option<&LossCause>) {
        self.session = session.clone();
        self.loss_cause = match session.state {
            SessionState::Lost => loss_cause.cloned().or_else(|| self.loss_cause.take()),
            _ => None,
        };
    }

    /// Resets both pipeline stages to idle.
    pub fn reset_stages(&mut self) {
        self.camera = StageStatus::Idle;
        self.link = StageStatus::Idle;
    }

    /// Main headline for the current screen.
    pub fn headline(&self) -> String {
        match self.session.state {
            SessionState::Idle => "Click to begin".to_string(),
            SessionState::Playing => format!("Level {}", self.session.level),
            SessionState::Completed => format!("Level {} Completed!", self.session.level),
            SessionState::Lost => "You Lose!".to_string(),
            SessionState::Won => "You Win!".to_string(),
        }
    }

    /// Zero-padded level counter, e.g. `03`.
    pub fn level_label(&self) -> String {
        format!("{:02}", self.session.level)
    }

    /// Returns `true` when the start action is offered.
    pub fn can_start(&self) -> bool {
        self.session.state == SessionState::Idle
    }

    /// Returns `true` when the next-level action is offered.
    pub fn can_advance(&self) -> bool {
        self.session.state == SessionState::Completed
    }
}

/// UI construction errors.
#[derive(Debug, Error, PartialEq)]
pub enum UiError {
    /// Dial range is empty, inverted or not finite.
    #[error("invalid dial range [{min}, {max}]")]
    InvalidRange {
        /// Requested lower bound.
        min: f64,
        /// Requested upper bound.
        max: f64,
    },
}
