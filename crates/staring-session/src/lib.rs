#![warn(missing_docs)]
//! # staring-session
//!
//! ## Purpose
//! Owns the play attempt and drives it through
//! `idle -> playing -> completed | lost | won`.
//!
//! ## Responsibilities
//! - Apply user actions (start, next level, restart) with legality checks.
//! - Apply playback signals, tagged by level so stale signals are ignored.
//! - Apply loss inputs: classifier verdicts, focus loss, playback faults.
//! - Keep the live replay buffer and snapshot it on loss.
//!
//! ## Data flow
//! Runtime signal -> state machine method -> [`Transition`] whose [`Effect`]
//! tells the runtime which pipeline resources to open or close.
//!
//! ## Ownership and lifetimes
//! The machine exclusively owns [`Session`] and the live [`ReplayBuffer`].
//! Loss snapshots are copies handed out inside [`Effect::Lost`].
//!
//! ## Error model
//! Illegal user actions return [`SessionError::IllegalTransition`]. Signals
//! that do not apply (wrong state or stale level) return `None`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use staring_classifier_contract::ClassificationEvent;
use staring_core::{Frame, LossCause, ReplayBuffer, ReplaySnapshot, Session, SessionState};
use staring_monitor::{Assessment, AttentionMonitor};
use thiserror::Error;

/// Delay before a loss replay is presented.
pub const DEFAULT_LOSS_REPLAY_DELAY: Duration = Duration::from_millis(1500);

/// Levels in the default plan.
pub const DEFAULT_LEVEL_COUNT: u32 = 3;

/// Ordered video sources; level `n` plays entry `n - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LevelPlan {
    sources: Vec<String>,
}

impl LevelPlan {
    /// Creates a validated plan.
    ///
    /// # Errors
    /// Returns [`SessionError::EmptyLevelPlan`] for an empty list.
    pub fn new(sources: Vec<String>) -> Result<Self, SessionError> {
        if sources.is_empty() {
            return Err(SessionError::EmptyLevelPlan);
        }
        Ok(Self { sources })
    }

    /// Number of levels.
    pub fn len(&self) -> u32 {
        u32::try_from(self.sources.len()).unwrap_or(u32::MAX)
    }

    /// Always `false`; plans are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source for a 1-based level.
    pub fn source(&self, level: u32) -> Option<&str> {
        let index = usize::try_from(level.checked_sub(1)?).ok()?;
        self.sources.get(index).map(String::as_str)
    }

    /// Returns `true` when `level` is the last configured level.
    pub fn is_final(&self, level: u32) -> bool {
        level >= self.len()
    }
}

impl Default for LevelPlan {
    fn default() -> Self {
        Self {
            sources: (1..=DEFAULT_LEVEL_COUNT)
                .map(|level| format!("/videos/level-{level}.mp4"))
                .collect(),
        }
    }
}

impl TryFrom<Vec<String>> for LevelPlan {
    type Error = SessionError;

    fn try_from(sources: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(sources)
    }
}

impl From<LevelPlan> for Vec<String> {
    fn from(plan: LevelPlan) -> Self {
        plan.sources
    }
}

/// Pipeline action implied by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open capture and link, play `source`.
    BeginMonitoring {
        /// Level entered.
        level: u32,
        /// Video source for the level.
        source: String,
    },
    /// Level video finished; close the monitoring scope.
    LevelCleared,
    /// Attempt lost; close the scope and present `replay` after the delay.
    Lost {
        /// Why the attempt ended.
        cause: LossCause,
        /// Frames captured before the loss.
        replay: ReplaySnapshot,
        /// Delay before presenting the replay.
        present_after: Duration,
    },
    /// Final level finished; close the scope.
    Won,
    /// Back to idle; close everything including a pending replay.
    Reset,
}

/// One applied state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State before.
    pub from: SessionState,
    /// State after.
    pub to: SessionState,
    /// Pipeline action.
    pub effect: Effect,
}

/// Session state machine with explicit legal transitions.
#[derive(Debug)]
pub struct SessionStateMachine {
    session: Session,
    replay: ReplayBuffer,
    plan: LevelPlan,
    monitor: AttentionMonitor,
    loss_replay_delay: Duration,
}

impl SessionStateMachine {
    /// Creates an idle machine.
    pub fn new(plan: LevelPlan, replay: ReplayBuffer, monitor: AttentionMonitor) -> Self {
        Self {
            session: Session::new(),
            replay,
            plan,
            monitor,
            loss_replay_delay: DEFAULT_LOSS_REPLAY_DELAY,
        }
    }

    /// Overrides the loss replay delay.
    pub fn with_loss_replay_delay(mut self, delay: Duration) -> Self {
        self.loss_replay_delay = delay;
        self
    }

    /// Current session snapshot.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Live replay buffer.
    pub fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    /// Level plan.
    pub fn plan(&self) -> &LevelPlan {
        &self.plan
    }

    /// Starts level 1 from idle.
    ///
    /// # Errors
    /// Returns [`SessionError::IllegalTransition`] outside `idle`.
    pub fn start(&mut self) -> Result<Transition, SessionError> {
        self.require("start", SessionState::Idle)?;
        Ok(self.enter_level(1))
    }

    /// Advances from `completed` to the next level.
    ///
    /// # Errors
    /// Returns [`SessionError::IllegalTransition`] outside `completed`.
    pub fn next_level(&mut self) -> Result<Transition, SessionError> {
        self.require("next level", SessionState::Completed)?;
        let next = self.session.level.saturating_add(1);
        Ok(self.enter_level(next))
    }

    /// Returns to idle from any state, discarding the attempt.
    pub fn restart(&mut self) -> Transition {
        let from = self.session.state;
        self.session = Session::new();
        self.replay.clear();
        Transition {
            from,
            to: SessionState::Idle,
            effect: Effect::Reset,
        }
    }

    /// Applies a playback "ended" signal for `level`.
    pub fn on_playback_ended(&mut self, level: u32) -> Option<Transition> {
        if !self.is_current_play(level) {
            return None;
        }

        let (to, effect) = if self.plan.is_final(level) {
            (SessionState::Won, Effect::Won)
        } else {
            (SessionState::Completed, Effect::LevelCleared)
        };
        Some(self.set_state(to, effect))
    }

    /// Applies a playback failure for `level`.
    pub fn on_playback_fault(&mut self, level: u32, reason: impl Into<String>) -> Option<Transition> {
        if !self.is_current_play(level) {
            return None;
        }
        Some(self.lose(LossCause::PlaybackFault {
            reason: reason.into(),
        }))
    }

    /// Applies page-hidden or window-blur. Idempotent outside `playing`.
    pub fn on_focus_lost(&mut self) -> Option<Transition> {
        if self.session.state != SessionState::Playing {
            return None;
        }
        Some(self.lose(LossCause::FocusLost))
    }

    /// Applies one classifier verdict.
    ///
    /// Blinks below the limit update the distraction count without a
    /// transition.
    pub fn on_classification(&mut self, event: &ClassificationEvent) -> Option<Transition> {
        match self.monitor.assess(&self.session, event) {
            Assessment::Inert | Assessment::Steady => None,
            Assessment::Distracted { count } => {
                self.session.distraction_count = count;
                None
            }
            Assessment::Loss(cause) => {
                if let LossCause::BlinkLimit { count } = cause {
                    self.session.distraction_count = count;
                }
                Some(self.lose(cause))
            }
        }
    }

    /// Records a captured frame; ignored outside `playing`.
    ///
    /// Returns `true` when the frame was recorded.
    pub fn record_frame(&mut self, frame: Frame) -> bool {
        if self.session.state != SessionState::Playing {
            return false;
        }
        self.replay.push(frame);
        true
    }

    fn require(&self, action: &'static str, expected: SessionState) -> Result<(), SessionError> {
        if self.session.state != expected {
            return Err(SessionError::IllegalTransition {
                action,
                state: self.session.state,
            });
        }
        Ok(())
    }

    fn is_current_play(&self, level: u32) -> bool {
        self.session.state == SessionState::Playing && self.session.level == level
    }

    fn enter_level(&mut self, level: u32) -> Transition {
        self.session.level = level;
        self.session.distraction_count = 0;
        self.replay.clear();
        let source = self.plan.source(level).unwrap_or_default().to_string();
        self.set_state(SessionState::Playing, Effect::BeginMonitoring { level, source })
    }

    fn lose(&mut self, cause: LossCause) -> Transition {
        let replay = self.replay.snapshot();
        self.replay.clear();
        let present_after = self.loss_replay_delay;
        self.set_state(
            SessionState::Lost,
            Effect::Lost {
                cause,
                replay,
                present_after,
            },
        )
    }

    fn set_state(&mut self, to: SessionState, effect: Effect) -> Transition {
        let from = std::mem::replace(&mut self.session.state, to);
        Transition { from, to, effect }
    }
}

/// Session error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// User action not allowed in the current state.
    #[error("cannot {action} while {state:?}")]
    IllegalTransition {
        /// Rejected action.
        action: &'static str,
        /// State at the time.
        state: SessionState,
    },
    /// Level plan has no entries.
    #[error("level plan must list at least one video source")]
    EmptyLevelPlan,
}
