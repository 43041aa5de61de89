#![warn(missing_docs)]
//! # staring-monitor
//!
//! ## Purpose
//! Interprets classifier verdicts into game semantics and applies the blink
//! limit.
//!
//! ## Responsibilities
//! - Ignore verdicts unless the session is playing a real level.
//! - Count distracted verdicts and signal loss at the blink limit.
//! - Signal loss immediately when the player looks away.
//!
//! ## Data flow
//! [`ClassificationEvent`] + current [`Session`] -> [`AttentionMonitor::assess`]
//! -> [`Assessment`] -> session state machine.
//!
//! ## Error model
//! Only construction fails ([`MonitorError`]). Assessment is total and pure.
//!
//! ## Example
//! ```rust
//! use staring_classifier_contract::{AttentionStatus, ClassificationEvent};
//! use staring_core::{Session, SessionState};
//! use staring_monitor::{Assessment, AttentionMonitor};
//!
//! let monitor = AttentionMonitor::default();
//! let session = Session { level: 1, state: SessionState::Playing, distraction_count: 0 };
//! let verdict = monitor.assess(&session, &ClassificationEvent::new(AttentionStatus::Distracted));
//! assert_eq!(verdict, Assessment::Distracted { count: 1 });
//! ```

use staring_classifier_contract::{AttentionStatus, ClassificationEvent};
use staring_core::{LossCause, Session};
use thiserror::Error;

/// Distracted verdicts tolerated per level; the verdict that reaches it loses.
pub const DEFAULT_MAX_BLINK_COUNT: u32 = 10;

/// Outcome of one verdict against the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// Session not monitored; verdict ignored.
    Inert,
    /// Player is paying attention.
    Steady,
    /// Blink counted; `count` is the new distraction count.
    Distracted {
        /// Distraction count after this verdict.
        count: u32,
    },
    /// Attempt is lost.
    Loss(LossCause),
}

/// Stateless verdict interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionMonitor {
    max_blink_count: u32,
}

impl AttentionMonitor {
    /// Creates a monitor with a custom blink limit.
    ///
    /// # Errors
    /// Returns [`MonitorError::ZeroBlinkLimit`] for `0`.
    pub fn new(max_blink_count: u32) -> Result<Self, MonitorError> {
        if max_blink_count == 0 {
            return Err(MonitorError::ZeroBlinkLimit);
        }
        Ok(Self { max_blink_count })
    }

    /// Configured blink limit.
    pub fn max_blink_count(&self) -> u32 {
        self.max_blink_count
    }

    /// Assesses one verdict. Never mutates the session.
    pub fn assess(&self, session: &Session, event: &ClassificationEvent) -> Assessment {
        if !session.is_monitored() {
            return Assessment::Inert;
        }

        match event.status {
            AttentionStatus::Ok => Assessment::Steady,
            AttentionStatus::LookedAway => Assessment::Loss(LossCause::LookedAway),
            AttentionStatus::Distracted => {
                let count = session.distraction_count.saturating_add(1);
                if count >= self.max_blink_count {
                    Assessment::Loss(LossCause::BlinkLimit { count })
                } else {
                    Assessment::Distracted { count }
                }
            }
        }
    }
}

impl Default for AttentionMonitor {
    fn default() -> Self {
        Self {
            max_blink_count: DEFAULT_MAX_BLINK_COUNT,
        }
    }
}

/// Monitor construction error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// A zero limit would lose on the first blink before counting it.
    #[error("max blink count must be greater than zero")]
    ZeroBlinkLimit,
}

#[cfg(test)]
mod tests {
    //! Unit tests for the blink limit and monitoring gate.

    use staring_core::SessionState;

    use super::*;

    fn playing(level: u32, distraction_count: u32) -> Session {
        Session {
            level,
            state: SessionState::Playing,
            distraction_count,
        }
    }

    fn distracted() -> ClassificationEvent {
        ClassificationEvent::new(AttentionStatus::Distracted)
    }

    #[test]
    fn ninth_blink_survives_and_tenth_loses() {
        let monitor = AttentionMonitor::default();
        let mut session = playing(1, 0);

        for expected in 1..=9 {
            match monitor.assess(&session, &distracted()) {
                Assessment::Distracted { count } => {
                    assert_eq!(count, expected);
                    session.distraction_count = count;
                }
                other => panic!("blink {expected} should not lose: {other:?}"),
            }
        }

        assert_eq!(
            monitor.assess(&session, &distracted()),
            Assessment::Loss(LossCause::BlinkLimit { count: 10 })
        );
    }

    #[test]
    fn looking_away_loses_regardless_of_count() {
        let monitor = AttentionMonitor::default();
        let event = ClassificationEvent::new(AttentionStatus::LookedAway);

        assert_eq!(
            monitor.assess(&playing(3, 0), &event),
            Assessment::Loss(LossCause::LookedAway)
        );
        assert_eq!(
            monitor.assess(&playing(3, 9), &event),
            Assessment::Loss(LossCause::LookedAway)
        );
    }

    #[test]
    fn verdicts_are_inert_outside_monitored_play() {
        let monitor = AttentionMonitor::default();
        let event = ClassificationEvent::new(AttentionStatus::LookedAway);

        assert_eq!(monitor.assess(&Session::new(), &event), Assessment::Inert);
        assert_eq!(monitor.assess(&playing(0, 0), &event), Assessment::Inert);

        let completed = Session {
            level: 2,
            state: SessionState::Completed,
            distraction_count: 4,
        };
        assert_eq!(monitor.assess(&completed, &event), Assessment::Inert);
    }

    #[test]
    fn attentive_verdict_is_steady() {
        let monitor = AttentionMonitor::default();
        let event = ClassificationEvent::new(AttentionStatus::Ok);
        assert_eq!(monitor.assess(&playing(1, 5), &event), Assessment::Steady);
    }

    #[test]
    fn rejects_zero_blink_limit() {
        assert_eq!(AttentionMonitor::new(0), Err(MonitorError::ZeroBlinkLimit));
        assert_eq!(
            AttentionMonitor::new(25).map(|monitor| monitor.max_blink_count()),
            Ok(25)
        );
    }
}
