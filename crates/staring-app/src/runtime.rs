//! Single-threaded game loop.
//!
//! One `select!` multiplexes external signals, the capture tick, classifier
//! link events, the loss replay delay and the replay frame tick. Every
//! branch is a future over an optional resource; an absent resource never
//! resolves, so closing it removes its branch.

use std::future;
use std::time::Instant;

use staring_capture::{CaptureConfig, FrameSource, FrameSourceProvider};
use staring_core::{Frame, LossCause, ReplayBuffer, ReplaySnapshot, Session};
use staring_encoder::FrameEncoder;
use staring_link::{LinkEvent, LinkEventReceiver, SendOutcome, StreamLink};
use staring_monitor::AttentionMonitor;
use staring_session::{Effect, SessionError, SessionStateMachine, Transition};
use staring_ui::{Point, ReplayPlayer, StageStatus, UiState};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{Span, debug, info, info_span, warn};

use crate::playback::PlaybackSurface;
use crate::{AppError, GameConfig, new_session_id};

/// External inputs to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum GameSignal {
    /// Player asked to begin.
    Start,
    /// Player asked for the next level.
    NextLevel,
    /// Play again / try again.
    Restart,
    /// Playback surface began a clip.
    PlaybackStarted {
        /// Level the clip belongs to.
        level: u32,
    },
    /// Playback surface finished a clip.
    PlaybackEnded {
        /// Level the clip belongs to.
        level: u32,
    },
    /// Playback surface could not play a clip.
    PlaybackFailed {
        /// Level the clip belongs to.
        level: u32,
        /// Surface-provided reason.
        reason: String,
    },
    /// Page became hidden.
    VisibilityHidden,
    /// Window lost focus.
    WindowBlur,
    /// One complete drag on a dial.
    DialDragged {
        /// Dial being dragged.
        control: DialControl,
        /// Dial center on screen.
        center: Point,
        /// Pointer positions in order.
        path: Vec<Point>,
    },
    /// Stop the runtime.
    Shutdown,
}

/// Dials on the game screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialControl {
    /// Video volume.
    Volume,
    /// Video brightness.
    Brightness,
}

/// A loss replay ready for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct LossReplay {
    /// Session that lost.
    pub session_id: String,
    /// Level that was lost.
    pub level: u32,
    /// Why it was lost.
    pub cause: LossCause,
    /// Frames leading up to the loss.
    pub snapshot: ReplaySnapshot,
}

/// Presentation layer seam.
pub trait GamePresenter {
    /// Called on every screen state change.
    fn session_changed(&mut self, ui: &UiState);

    /// Called once the loss delay has elapsed.
    fn replay_ready(&mut self, replay: &LossReplay);

    /// Called for each replay frame; `position` is 1-based.
    fn replay_frame(&mut self, frame: &Frame, position: usize, total: usize);
}

/// Capture source, classifier link and capture ticker for one `playing`
/// state.
pub struct MonitoringScope {
    level: u32,
    source: Box<dyn FrameSource>,
    link: Option<StreamLink>,
    events: Option<LinkEventReceiver>,
    ticker: Interval,
    sequence: u64,
    span: Span,
}

enum ScopeStep {
    Tick,
    Link(LinkEvent),
    LinkGone,
}

impl MonitoringScope {
    /// Level this scope monitors.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Returns `true` while a classifier link is connecting or open.
    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    /// Frames encoded so far.
    pub fn frames_captured(&self) -> u64 {
        self.sequence
    }

    async fn next_step(&mut self) -> ScopeStep {
        tokio::select! {
            _ = self.ticker.tick() => ScopeStep::Tick,
            event = next_link_event(&mut self.events) => match event {
                Some(event) => ScopeStep::Link(event),
                None => ScopeStep::LinkGone,
            },
        }
    }

    /// Samples, encodes and sends one frame. `Ok(None)` means the source has
    /// no dimensions yet.
    fn capture(&mut self, encoder: &FrameEncoder) -> Result<Option<Frame>, AppError> {
        let _entered = self.span.enter();
        let Some(raster) = self.source.sample()? else {
            return Ok(None);
        };

        self.sequence += 1;
        let frame = encoder.encode_frame(&raster, Instant::now(), self.sequence)?;
        if let Some(link) = &self.link
            && let SendOutcome::Dropped(reason) = link.send(&frame)
        {
            debug!(sequence = frame.sequence(), bytes = frame.len(), ?reason, "frame not sent");
        }
        Ok(Some(frame))
    }

    fn close(mut self) {
        if let Some(link) = self.link.as_mut() {
            self.span.in_scope(|| link.close());
            let stats = link.stats();
            info!(
                parent: &self.span,
                queued = stats.queued,
                dropped = stats.dropped,
                received = stats.received,
                malformed = stats.malformed,
                "classifier link stats"
            );
        }
        info!(parent: &self.span, frames = self.sequence, "monitoring scope closed");
    }
}

struct PendingReplay {
    due: tokio::time::Instant,
    replay: LossReplay,
}

struct ReplayPlayback {
    player: ReplayPlayer,
    ticker: Interval,
}

enum Step {
    Signal(GameSignal),
    Scope(ScopeStep),
    ReplayDue,
    ReplayTick,
}

/// Owns the session, the live pipeline and the presentation seams.
pub struct GameRuntime<P, S> {
    config: GameConfig,
    capture: CaptureConfig,
    encoder: FrameEncoder,
    machine: SessionStateMachine,
    provider: Box<dyn FrameSourceProvider>,
    presenter: P,
    playback: S,
    ui: UiState,
    monitoring_enabled: bool,
    session_id: String,
    scope: Option<MonitoringScope>,
    pending_replay: Option<PendingReplay>,
    replay: Option<ReplayPlayback>,
}

impl<P, S> GameRuntime<P, S>
where
    P: GamePresenter,
    S: PlaybackSurface,
{
    /// Builds an idle runtime.
    ///
    /// # Errors
    /// Returns [`AppError`] when `config` fails validation.
    pub fn new(
        config: GameConfig,
        provider: Box<dyn FrameSourceProvider>,
        presenter: P,
        playback: S,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let capture = config.capture_config()?;
        let encoder = FrameEncoder::new(config.encoder_config())?;
        let replay = ReplayBuffer::new(config.replay_capacity()?)?;
        let monitor = AttentionMonitor::new(config.max_blink_count)?;
        let machine = SessionStateMachine::new(config.levels.clone(), replay, monitor)
            .with_loss_replay_delay(config.loss_replay_delay());
        let ui = UiState::new(crate::app_version(), config.levels.len());

        Ok(Self {
            config,
            capture,
            encoder,
            machine,
            provider,
            presenter,
            playback,
            ui,
            monitoring_enabled: true,
            session_id: new_session_id(),
            scope: None,
            pending_replay: None,
            replay: None,
        })
    }

    /// Enables or disables attention monitoring.
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring_enabled = enabled;
        self
    }

    /// Presenter.
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Playback surface.
    pub fn playback(&self) -> &S {
        &self.playback
    }

    /// Current screen state.
    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    /// Current session.
    pub fn session(&self) -> &Session {
        self.machine.session()
    }

    /// Live monitoring scope, if any.
    pub fn scope(&self) -> Option<&MonitoringScope> {
        self.scope.as_ref()
    }

    /// Runs until [`GameSignal::Shutdown`] or until every signal sender is
    /// dropped, then releases all resources.
    pub async fn run(&mut self, mut signals: UnboundedReceiver<GameSignal>) {
        info!(
            version = crate::app_version(),
            monitoring = self.monitoring_enabled,
            levels = self.config.levels.len(),
            "game runtime started"
        );
        self.present();

        loop {
            let step = tokio::select! {
                signal = signals.recv() => Step::Signal(signal.unwrap_or(GameSignal::Shutdown)),
                step = next_scope_step(&mut self.scope) => Step::Scope(step),
                _ = replay_due(&self.pending_replay) => Step::ReplayDue,
                _ = replay_tick(&mut self.replay) => Step::ReplayTick,
            };

            match step {
                Step::Signal(GameSignal::Shutdown) => break,
                Step::Signal(signal) => self.handle_signal(signal),
                Step::Scope(ScopeStep::Tick) => self.on_capture_tick(),
                Step::Scope(ScopeStep::Link(event)) => self.on_link_event(event),
                Step::Scope(ScopeStep::LinkGone) => {
                    if let Some(scope) = self.scope.as_mut() {
                        scope.events = None;
                    }
                }
                Step::ReplayDue => self.present_replay(),
                Step::ReplayTick => self.show_replay_frame(),
            }
        }

        self.pending_replay = None;
        self.replay = None;
        self.end_attempt();
        info!("game runtime stopped");
    }

    fn handle_signal(&mut self, signal: GameSignal) {
        let transition = match signal {
            GameSignal::Start => {
                let result = self.machine.start();
                if result.is_ok() {
                    self.session_id = new_session_id();
                }
                user_action(result)
            }
            GameSignal::NextLevel => user_action(self.machine.next_level()),
            GameSignal::Restart => Some(self.machine.restart()),
            GameSignal::PlaybackStarted { level } => {
                debug!(level, "clip playing");
                None
            }
            GameSignal::PlaybackEnded { level } => {
                let transition = self.machine.on_playback_ended(level);
                if transition.is_none() {
                    debug!(level, "ignoring ended signal for inactive level");
                }
                transition
            }
            GameSignal::PlaybackFailed { level, reason } => {
                warn!(level, "playback failed: {reason}");
                self.machine.on_playback_fault(level, reason)
            }
            GameSignal::VisibilityHidden | GameSignal::WindowBlur => self.machine.on_focus_lost(),
            GameSignal::DialDragged {
                control,
                center,
                path,
            } => {
                let dial = match control {
                    DialControl::Volume => &mut self.ui.volume,
                    DialControl::Brightness => &mut self.ui.brightness,
                };
                let mut gesture = dial.begin_drag(center);
                for point in path {
                    gesture.pointer_moved(point);
                }
                let value = gesture.release();
                debug!(?control, value, "dial adjusted");
                self.present();
                None
            }
            GameSignal::Shutdown => None,
        };

        if let Some(transition) = transition {
            self.apply(transition);
        }
    }

    fn apply(&mut self, transition: Transition) {
        let mut next = Some(transition);
        while let Some(transition) = next.take() {
            next = self.apply_one(transition);
        }
    }

    fn apply_one(&mut self, transition: Transition) -> Option<Transition> {
        let Transition { from, to, effect } = transition;
        let session = self.machine.session().clone();
        info!(
            session_id = %self.session_id,
            level = session.level,
            ?from,
            ?to,
            "session transition"
        );

        let mut loss_cause = None;
        let mut follow_up = None;
        match effect {
            Effect::BeginMonitoring { level, source } => {
                self.close_scope();
                if self.monitoring_enabled {
                    self.open_scope(level);
                }
                if let Err(error) = self.playback.play(level, &source) {
                    warn!(level, "clip failed to start: {error}");
                    follow_up = self.machine.on_playback_fault(level, error.to_string());
                }
            }
            Effect::LevelCleared | Effect::Won => self.end_attempt(),
            Effect::Lost {
                cause,
                replay,
                present_after,
            } => {
                self.end_attempt();
                info!(?cause, frames = replay.len(), "attempt lost");
                loss_cause = Some(cause.clone());
                self.pending_replay = Some(PendingReplay {
                    due: tokio::time::Instant::now() + present_after,
                    replay: LossReplay {
                        session_id: self.session_id.clone(),
                        level: session.level,
                        cause,
                        snapshot: replay,
                    },
                });
            }
            Effect::Reset => {
                self.end_attempt();
                if self.pending_replay.take().is_some() {
                    debug!("pending loss replay cancelled");
                }
                self.replay = None;
            }
        }

        self.ui.apply_session(&session, loss_cause.as_ref());
        self.present();
        follow_up
    }

    fn open_scope(&mut self, level: u32) {
        let span = info_span!("monitoring", session_id = %self.session_id, level);
        self.ui.camera = StageStatus::Running;

        let source = match self.provider.acquire(&self.capture) {
            Ok(source) => source,
            Err(error) => {
                warn!(parent: &span, "camera unavailable, playing unmonitored: {error}");
                self.ui.camera = StageStatus::Degraded;
                return;
            }
        };

        self.ui.link = StageStatus::Running;
        let mut link = StreamLink::with_connect_timeout(self.config.connect_timeout());
        let events = match span.in_scope(|| link.connect(&self.config.classifier_endpoint)) {
            Ok(events) => Some(events),
            Err(error) => {
                warn!(parent: &span, "classifier rejected, recording without verdicts: {error}");
                self.ui.link = StageStatus::Degraded;
                None
            }
        };
        let link = events.is_some().then_some(link);

        let mut ticker = tokio::time::interval(self.capture.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            parent: &span,
            source = source.name(),
            linked = link.is_some(),
            interval_ms = self.capture.interval_ms(),
            "monitoring scope opened"
        );
        self.scope = Some(MonitoringScope {
            level,
            source,
            link,
            events,
            ticker,
            sequence: 0,
            span,
        });
    }

    fn close_scope(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.close();
        }
        self.ui.reset_stages();
    }

    fn end_attempt(&mut self) {
        self.close_scope();
        self.playback.stop();
    }

    fn on_capture_tick(&mut self) {
        let Some(scope) = self.scope.as_mut() else {
            return;
        };

        match scope.capture(&self.encoder) {
            Ok(Some(frame)) => {
                self.machine.record_frame(frame);
                if self.ui.camera != StageStatus::Healthy {
                    self.ui.camera = StageStatus::Healthy;
                    self.present();
                }
            }
            Ok(None) => {}
            Err(error) => {
                if self.ui.camera != StageStatus::Degraded {
                    warn!(parent: &scope.span, "capture failing: {error}");
                    self.ui.camera = StageStatus::Degraded;
                    self.present();
                } else {
                    debug!(parent: &scope.span, "capture tick failed: {error}");
                }
            }
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Ready => {
                self.ui.link = StageStatus::Healthy;
                self.present();
            }
            LinkEvent::Classification(event) => {
                let before = self.machine.session().distraction_count;
                match self.machine.on_classification(&event) {
                    Some(transition) => self.apply(transition),
                    None => {
                        let count = self.machine.session().distraction_count;
                        if count != before {
                            debug!(count, ear = ?event.eye_aspect_ratio, "blink counted");
                            self.ui.apply_session(self.machine.session(), None);
                            self.present();
                        }
                    }
                }
            }
            LinkEvent::ConnectFailed { reason } => {
                warn!("classifier unavailable, recording without verdicts: {reason}");
                self.ui.link = StageStatus::Degraded;
                if let Some(scope) = self.scope.as_mut() {
                    scope.link = None;
                }
                self.present();
            }
            LinkEvent::Closed { reason } => {
                warn!("classifier link closed: {reason}");
                self.ui.link = StageStatus::Degraded;
                self.present();
            }
        }
    }

    fn present_replay(&mut self) {
        let Some(pending) = self.pending_replay.take() else {
            return;
        };
        self.presenter.replay_ready(&pending.replay);

        if pending.replay.snapshot.is_empty() {
            return;
        }
        let mut ticker = tokio::time::interval(self.capture.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.replay = Some(ReplayPlayback {
            player: ReplayPlayer::new(pending.replay.snapshot),
            ticker,
        });
    }

    fn show_replay_frame(&mut self) {
        let Some(playback) = self.replay.as_mut() else {
            return;
        };

        let total = playback.player.snapshot().len();
        let position = playback.player.position() + 1;
        if let Some(frame) = playback.player.advance() {
            self.presenter.replay_frame(frame, position, total);
        }
        if playback.player.is_finished() {
            self.replay = None;
        }
    }

    fn present(&mut self) {
        self.presenter.session_changed(&self.ui);
    }
}

fn user_action(result: Result<Transition, SessionError>) -> Option<Transition> {
    match result {
        Ok(transition) => Some(transition),
        Err(error) => {
            warn!("ignoring action: {error}");
            None
        }
    }
}

async fn next_scope_step(scope: &mut Option<MonitoringScope>) -> ScopeStep {
    match scope {
        Some(scope) => scope.next_step().await,
        None => future::pending().await,
    }
}

async fn next_link_event(events: &mut Option<LinkEventReceiver>) -> Option<LinkEvent> {
    match events {
        Some(events) => events.recv().await,
        None => future::pending().await,
    }
}

async fn replay_due(pending: &Option<PendingReplay>) {
    match pending {
        Some(pending) => tokio::time::sleep_until(pending.due).await,
        None => future::pending().await,
    }
}

async fn replay_tick(replay: &mut Option<ReplayPlayback>) {
    match replay {
        Some(replay) => {
            replay.ticker.tick().await;
        }
        None => future::pending().await,
    }
}
