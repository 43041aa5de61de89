#![warn(missing_docs)]
//! # staring-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `staring-contest` workspace.
//!
//! ## Responsibilities
//! - Represent raw camera rasters and encoded frames.
//! - Keep a bounded, capture-ordered replay buffer of recent frames.
//! - Model the play session (level, state, distraction count) and loss causes.
//!
//! ## Data flow
//! Capture code samples a [`Raster`], the encoder turns it into a [`Frame`],
//! and the frame is copied into the [`ReplayBuffer`] while another copy goes
//! to the network link. On loss the buffer is frozen into a
//! [`ReplaySnapshot`] for playback.
//!
//! ## Ownership and lifetimes
//! Rasters, frames and snapshots own their buffers (`Vec<u8>`), so the replay
//! buffer never shares memory with a frame that is in flight on the link.
//!
//! ## Error model
//! Shape and capacity validation failures return [`CoreError`].
//!
//! ## Example
//! ```rust
//! use std::time::Instant;
//! use staring_core::{Frame, ReplayBuffer};
//!
//! let mut buffer = ReplayBuffer::new(2).expect("valid capacity");
//! let start = Instant::now();
//! for sequence in 0..3 {
//!     buffer.push(Frame::new(vec![sequence as u8], start, sequence));
//! }
//! let snapshot = buffer.snapshot();
//! assert_eq!(snapshot.sequences(), vec![1, 2]);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Uncompressed RGB8 camera image sampled from a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major RGB bytes (`width * height * 3`).
    pub rgb: Vec<u8>,
}

impl Raster {
    /// Constructs a validated raster.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidRasterShape`] when the pixel buffer length
    /// is not exactly `width * height * 3`, and [`CoreError::EmptyRaster`] for
    /// zero-sized geometry.
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, CoreError> {
        if width == 0 || height == 0 {
            return Err(CoreError::EmptyRaster);
        }

        let expected = required_rgb_len(width, height)?;
        if rgb.len() != expected {
            return Err(CoreError::InvalidRasterShape {
                expected,
                actual: rgb.len(),
            });
        }

        Ok(Self { width, height, rgb })
    }

    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// One encoded camera capture.
///
/// Frames are immutable once produced; clones are independent copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
    captured_at: Instant,
    sequence: u64,
}

impl Frame {
    /// Wraps encoded bytes captured at `captured_at`.
    pub fn new(payload: Vec<u8>, captured_at: Instant, sequence: u64) -> Self {
        Self {
            payload,
            captured_at,
            sequence,
        }
    }

    /// Encoded image bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Monotonic capture instant.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Capture sequence number within its monitoring scope.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Computes replay capacity as `fps * window_secs`.
///
/// # Errors
/// Returns [`CoreError::InvalidReplayCapacity`] when the product is zero or
/// overflows.
pub fn replay_capacity(fps: u32, window_secs: u32) -> Result<usize, CoreError> {
    let frames = (fps as usize)
        .checked_mul(window_secs as usize)
        .ok_or(CoreError::InvalidReplayCapacity)?;
    if frames == 0 {
        return Err(CoreError::InvalidReplayCapacity);
    }
    Ok(frames)
}

/// Frames reserved up front by [`ReplayBuffer::new`]; larger buffers grow on
/// demand.
pub const MAX_PREALLOCATED_FRAMES: usize = 256;

/// Fixed-capacity ring of recent frames in capture order.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    capacity: usize,
    frames: VecDeque<Frame>,
}

impl ReplayBuffer {
    /// Creates an empty buffer holding at most `capacity` frames.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidReplayCapacity`] when `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::InvalidReplayCapacity);
        }

        Ok(Self {
            capacity,
            frames: VecDeque::with_capacity(capacity.min(MAX_PREALLOCATED_FRAMES)),
        })
    }

    /// Appends one frame, evicting the oldest when full.
    ///
    /// # Returns
    /// The evicted frame, if any.
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        // Invariant: `len() <= capacity` after every push.
        let evicted = if self.frames.len() == self.capacity {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Copies current contents into an independent snapshot.
    pub fn snapshot(&self) -> ReplaySnapshot {
        ReplaySnapshot {
            frames: self.frames.iter().cloned().collect(),
        }
    }

    /// Drops all buffered frames.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Returns buffered frame count.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` when no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates buffered frames oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

/// Frozen copy of the replay buffer taken at the moment of loss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySnapshot {
    frames: Vec<Frame>,
}

impl ReplaySnapshot {
    /// Frames in capture order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` when the snapshot holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sequence numbers in capture order.
    pub fn sequences(&self) -> Vec<u64> {
        self.frames.iter().map(Frame::sequence).collect()
    }

    /// Time span between the first and last frame.
    pub fn duration(&self) -> Duration {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last
                .captured_at()
                .saturating_duration_since(first.captured_at()),
            _ => Duration::ZERO,
        }
    }

    /// Offset of `frame` from the first frame of the snapshot.
    pub fn offset_of(&self, frame: &Frame) -> Duration {
        self.frames
            .first()
            .map(|first| frame.captured_at().saturating_duration_since(first.captured_at()))
            .unwrap_or(Duration::ZERO)
    }
}

impl<'a> IntoIterator for &'a ReplaySnapshot {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Lifecycle state of one play attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Level 0, awaiting start.
    #[default]
    Idle,
    /// Video running and monitoring active.
    Playing,
    /// Current level's video finished without loss.
    Completed,
    /// Attempt ended by monitoring, focus loss or playback fault.
    Lost,
    /// Final configured level completed.
    Won,
}

impl SessionState {
    /// Returns `true` for states with no forward edge except restart.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Lost | Self::Won)
    }
}

/// The current play attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Current level; `0` while idle.
    pub level: u32,
    /// Lifecycle state.
    pub state: SessionState,
    /// Distracted events observed in the current level.
    pub distraction_count: u32,
}

impl Session {
    /// Returns a fresh idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while attention is being enforced.
    pub fn is_monitored(&self) -> bool {
        self.state == SessionState::Playing && self.level > 0
    }
}

/// Why an attempt was lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum LossCause {
    /// Classifier reported the player looking away.
    LookedAway,
    /// Distracted events reached the blink limit.
    BlinkLimit {
        /// Distraction count at the moment of loss.
        count: u32,
    },
    /// Page became hidden or window lost focus.
    FocusLost,
    /// Video could not be played.
    PlaybackFault {
        /// Surface-provided reason.
        reason: String,
    },
}

/// Error type for core data model validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Raster buffer length does not match declared geometry.
    #[error("invalid raster shape: expected {expected} bytes, got {actual}")]
    InvalidRasterShape {
        /// Expected RGB byte count.
        expected: usize,
        /// Actual RGB byte count.
        actual: usize,
    },
    /// Raster must have non-zero width and height.
    #[error("raster dimensions must be non-zero")]
    EmptyRaster,
    /// Raster dimensions overflow addressable memory.
    #[error("raster dimensions overflow")]
    DimensionOverflow,
    /// Replay capacity must be strictly positive.
    #[error("replay capacity must be greater than zero")]
    InvalidReplayCapacity,
}

fn required_rgb_len(width: u32, height: u32) -> Result<usize, CoreError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or(CoreError::DimensionOverflow)
}
