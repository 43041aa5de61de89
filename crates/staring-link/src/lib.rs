#![warn(missing_docs)]
//! # staring-link
//!
//! ## Purpose
//! Manages the persistent WebSocket link to the attention classifier.
//!
//! ## Responsibilities
//! - Validate the classifier endpoint (`ws`/`wss` with a host).
//! - Model the connection as an explicit [`LinkState`] machine.
//! - Stream encoded frames outbound, dropping rather than queueing when the
//!   link is not ready.
//! - Parse inbound messages into [`LinkEvent`]s in arrival order.
//!
//! ## Data flow
//! Capture tick -> [`StreamLink::send`] -> single-slot outbound queue ->
//! writer task -> socket. Socket -> reader task -> classifier contract parse
//! -> [`LinkEventReceiver`] -> runtime.
//!
//! ## Ownership and lifetimes
//! One monitoring scope owns one link. The link keeps no frame after a send
//! attempt. Neither connect nor close waits on the socket: the handshake and
//! both I/O directions run on one background task, which
//! [`StreamLink::close`] detaches with a bounded drain and drop cancels.
//!
//! ## Error model
//! Endpoint policy violations return [`LinkError`]; handshake failures arrive
//! as [`LinkEvent::ConnectFailed`]. Send never fails: it
//! reports [`SendOutcome::Dropped`]. Malformed inbound messages are counted and
//! logged, never propagated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use staring_classifier_contract::{ClassificationEvent, parse_classification};
use staring_core::Frame;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use url::Url;

/// Upper bound for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for the detached drain after close.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Outbound frames allowed in flight before new frames are dropped.
pub const OUTBOUND_QUEUE_DEPTH: usize = 1;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receiver half handed out by [`StreamLink::connect`].
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// No socket.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket ready for frames.
    Open,
    /// Local close in progress.
    Closing,
    /// Connect or transport failure; always followed by `Disconnected`.
    Failed,
}

impl LinkState {
    /// Returns `true` when `self -> next` is a legal edge.
    pub fn can_transition_to(self, next: LinkState) -> bool {
        use LinkState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Open)
                | (Connecting, Failed)
                | (Connecting, Closing)
                | (Open, Closing)
                | (Open, Failed)
                | (Open, Disconnected)
                | (Closing, Disconnected)
                | (Closing, Failed)
                | (Failed, Disconnected)
        )
    }
}

/// Events delivered to the link owner, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Handshake finished; frames may be sent.
    Ready,
    /// Handshake refused or timed out; the link is disconnected.
    ConnectFailed {
        /// Human-readable cause.
        reason: String,
    },
    /// One parsed classifier verdict.
    Classification(ClassificationEvent),
    /// Remote close or transport error while open.
    Closed {
        /// Human-readable cause.
        reason: String,
    },
}

/// Result of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame handed to the writer task.
    Queued,
    /// Frame discarded.
    Dropped(DropReason),
}

/// Why a frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Link is not open.
    NotOpen,
    /// Previous frame still in flight.
    Backpressure,
}

/// Counter snapshot for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames handed to the writer.
    pub queued: u64,
    /// Frames dropped for any reason.
    pub dropped: u64,
    /// Classifier events delivered.
    pub received: u64,
    /// Inbound messages discarded as malformed.
    pub malformed: u64,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<LinkState>,
    queued: AtomicU64,
    dropped: AtomicU64,
    received: AtomicU64,
    malformed: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: RwLock::new(LinkState::Disconnected),
            queued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            received: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    fn state(&self) -> LinkState {
        *self.state.read()
    }

    fn transition(&self, next: LinkState) -> Result<LinkState, LinkError> {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            return Err(LinkError::IllegalTransition {
                from: *state,
                to: next,
            });
        }
        let previous = std::mem::replace(&mut *state, next);
        debug!(from = ?previous, to = ?next, "link state changed");
        Ok(previous)
    }

    /// Ends an open link from the I/O side. Returns `true` when the link was
    /// open, i.e. the owner did not initiate the close.
    fn finish_from_io(&self, failed: bool) -> bool {
        let mut state = self.state.write();
        if *state != LinkState::Open {
            return false;
        }
        if failed {
            debug!(from = ?LinkState::Open, to = ?LinkState::Failed, "link state changed");
        }
        *state = LinkState::Disconnected;
        debug!(to = ?LinkState::Disconnected, "link state changed");
        true
    }

    fn stats(&self) -> LinkStats {
        LinkStats {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Duplex link to the classifier service.
#[derive(Debug)]
pub struct StreamLink {
    shared: Arc<Shared>,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    connect_timeout: Duration,
}

impl StreamLink {
    /// Creates a disconnected link.
    pub fn new() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Creates a disconnected link with a custom handshake timeout.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            outbound: None,
            cancel: CancellationToken::new(),
            task: None,
            connect_timeout,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LinkStats {
        self.shared.stats()
    }

    /// Starts opening the duplex channel to `endpoint` and returns at once.
    ///
    /// The link is `Connecting` on return and the handshake runs on a
    /// background task. [`LinkEvent::Ready`] is the first event once the
    /// link is `Open`; [`LinkEvent::ConnectFailed`] reports a refused or
    /// timed-out handshake, after which the link is `Disconnected` again.
    /// Frames sent before `Ready` are dropped. No retry is attempted.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// - [`LinkError::InvalidEndpoint`] for non-`ws`/`wss` URLs.
    /// - [`LinkError::AlreadyActive`] unless the link is disconnected.
    pub fn connect(&mut self, endpoint: &str) -> Result<LinkEventReceiver, LinkError> {
        let url = validate_endpoint(endpoint)?;
        let state = self.state();
        if state != LinkState::Disconnected {
            return Err(LinkError::AlreadyActive(state));
        }
        self.shared.transition(LinkState::Connecting)?;

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.cancel = CancellationToken::new();
        self.outbound = Some(outbound_tx);
        self.task = Some(tokio::spawn(
            run_link(
                url,
                self.connect_timeout,
                outbound_rx,
                events_tx,
                Arc::clone(&self.shared),
                self.cancel.clone(),
            )
            .in_current_span(),
        ));

        Ok(events_rx)
    }

    /// Hands one frame to the writer; fire-and-forget.
    ///
    /// Frames are dropped, never queued or retried, when the link is not
    /// open or the previous frame is still in flight.
    pub fn send(&self, frame: &Frame) -> SendOutcome {
        let outcome = match (&self.outbound, self.state()) {
            (Some(outbound), LinkState::Open) => match outbound.try_send(frame.payload().to_vec()) {
                Ok(()) => SendOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    SendOutcome::Dropped(DropReason::Backpressure)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    SendOutcome::Dropped(DropReason::NotOpen)
                }
            },
            _ => SendOutcome::Dropped(DropReason::NotOpen),
        };

        match outcome {
            SendOutcome::Queued => self.shared.queued.fetch_add(1, Ordering::Relaxed),
            SendOutcome::Dropped(_) => self.shared.dropped.fetch_add(1, Ordering::Relaxed),
        };
        outcome
    }

    /// Closes the link without waiting on the socket. Idempotent.
    ///
    /// The link is `Disconnected` on return. An open socket is handed to a
    /// detached task that sends the close frame and is cancelled after
    /// [`CLOSE_TIMEOUT`]; a pending handshake is cancelled at once.
    pub fn close(&mut self) {
        let from = self.state();
        if self.shared.transition(LinkState::Closing).is_ok() {
            // Dropping the sender makes the writer emit a close frame.
            self.outbound = None;
            match (from, self.task.take()) {
                (LinkState::Open, Some(task)) => {
                    tokio::spawn(drain_on_close(task, self.cancel.clone()).in_current_span());
                }
                (_, task) => {
                    self.cancel.cancel();
                    if let Some(task) = task {
                        task.abort();
                    }
                }
            }
            let _ = self.shared.transition(LinkState::Disconnected);
            info!(from = ?from, "classifier link closed");
        }

        self.release_tasks();
    }

    fn release_tasks(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            task.abort();
        }
    }
}

impl Default for StreamLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamLink {
    fn drop(&mut self) {
        self.outbound = None;
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn drain_on_close(mut task: JoinHandle<()>, cancel: CancellationToken) {
    if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
        debug!("classifier link did not drain in time, cancelling");
        cancel.cancel();
        task.abort();
    }
}

/// Handshake, then both I/O directions until close or failure.
async fn run_link(
    url: Url,
    connect_timeout: Duration,
    outbound: mpsc::Receiver<Vec<u8>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let attempt = tokio::select! {
        _ = cancel.cancelled() => return,
        attempt = tokio::time::timeout(connect_timeout, connect_async(url.as_str())) => attempt,
    };

    let stream = match attempt {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(error)) => return fail_connect(&url, error.to_string(), &shared, &events),
        Err(_) => {
            let reason = format!("handshake timed out after {connect_timeout:?}");
            return fail_connect(&url, reason, &shared, &events);
        }
    };

    // Open before any I/O so a close seen by the reader is never lost.
    if shared.transition(LinkState::Open).is_err() {
        debug!(endpoint = %url, "handshake finished after local close");
        return;
    }
    info!(endpoint = %url, "classifier link open");
    let _ = events.send(LinkEvent::Ready);

    let (sink, stream) = stream.split();
    tokio::join!(
        write_loop(sink, outbound, Arc::clone(&shared), cancel.clone(), events.clone()),
        read_loop(stream, events, shared, cancel),
    );
}

fn fail_connect(
    url: &Url,
    reason: String,
    shared: &Shared,
    events: &mpsc::UnboundedSender<LinkEvent>,
) {
    if shared.transition(LinkState::Failed).is_err() {
        return;
    }
    warn!(endpoint = %url, "classifier link failed to open: {reason}");
    let _ = shared.transition(LinkState::Disconnected);
    let _ = events.send(LinkEvent::ConnectFailed { reason });
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = outbound.recv() => next,
        };

        match next {
            Some(payload) => {
                if let Err(error) = sink.send(Message::Binary(payload)).await {
                    let reason = format!("send failed: {error}");
                    warn!("classifier link {reason}");
                    if shared.finish_from_io(true) {
                        let _ = events.send(LinkEvent::Closed { reason });
                    }
                    cancel.cancel();
                    break;
                }
            }
            None => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                break;
            }
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<LinkEvent>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        let (reason, failed) = match next {
            Some(Ok(Message::Text(text))) => {
                deliver(&text, &events, &shared);
                continue;
            }
            Some(Ok(Message::Binary(bytes))) => {
                match String::from_utf8(bytes) {
                    Ok(text) => deliver(&text, &events, &shared),
                    Err(_) => {
                        shared.malformed.fetch_add(1, Ordering::Relaxed);
                        warn!("discarding non-utf8 classifier message");
                    }
                }
                continue;
            }
            Some(Ok(Message::Close(frame))) => (
                frame
                    .map(|frame| format!("remote closed: {}", frame.reason))
                    .unwrap_or_else(|| "remote closed".to_string()),
                false,
            ),
            Some(Ok(_)) => continue,
            Some(Err(error)) => (format!("receive failed: {error}"), true),
            None => ("stream ended".to_string(), false),
        };

        if shared.finish_from_io(failed) {
            if failed {
                warn!("classifier link {reason}");
            } else {
                info!("classifier link {reason}");
            }
            let _ = events.send(LinkEvent::Closed { reason });
        }
        cancel.cancel();
        break;
    }
}

fn deliver(text: &str, events: &mpsc::UnboundedSender<LinkEvent>, shared: &Shared) {
    match parse_classification(text) {
        Ok(event) => {
            shared.received.fetch_add(1, Ordering::Relaxed);
            let _ = events.send(LinkEvent::Classification(event));
        }
        Err(error) => {
            shared.malformed.fetch_add(1, Ordering::Relaxed);
            warn!("discarding malformed classifier message: {error}");
        }
    }
}

/// Validates the classifier endpoint.
///
/// # Errors
/// Returns [`LinkError::InvalidEndpoint`] for unparsable URLs, schemes other
/// than `ws`/`wss`, or a missing host.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, LinkError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| LinkError::InvalidEndpoint(format!("invalid classifier url: {error}")))?;

    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(LinkError::InvalidEndpoint(
            "classifier endpoint must use ws or wss".to_string(),
        ));
    }

    if parsed.host_str().is_none() {
        return Err(LinkError::InvalidEndpoint(
            "classifier endpoint must name a host".to_string(),
        ));
    }

    Ok(parsed)
}

/// Link error type.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Endpoint violates URL policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Connect called on a link that is not disconnected.
    #[error("link is already {0:?}")]
    AlreadyActive(LinkState),
    /// Attempted an edge outside the link state machine.
    #[error("illegal link transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state.
        from: LinkState,
        /// Requested state.
        to: LinkState,
    },
}

#[cfg(test)]
mod tests {
    //! Unit tests for endpoint policy and state edges.

    use std::time::Instant;

    use super::*;

    #[test]
    fn validates_endpoint_policy() {
        validate_endpoint("ws://localhost:8000/ws/video").expect("ws endpoint should pass");
        validate_endpoint("wss://classifier.example/ws/video").expect("wss endpoint should pass");
        assert!(validate_endpoint("http://localhost:8000/ws/video").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }

    #[test]
    fn failed_only_returns_to_disconnected() {
        assert!(LinkState::Failed.can_transition_to(LinkState::Disconnected));
        assert!(!LinkState::Failed.can_transition_to(LinkState::Open));
        assert!(!LinkState::Disconnected.can_transition_to(LinkState::Open));
        assert!(LinkState::Open.can_transition_to(LinkState::Closing));
    }

    #[test]
    fn close_on_disconnected_link_is_a_no_op() {
        let mut link = StreamLink::new();
        link.close();
        link.close();
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[test]
    fn connecting_may_close_but_never_skip_to_open_from_disconnected() {
        assert!(LinkState::Connecting.can_transition_to(LinkState::Closing));
        assert!(!LinkState::Closing.can_transition_to(LinkState::Open));
    }

    #[test]
    fn send_while_disconnected_drops_frame() {
        let link = StreamLink::new();
        let frame = Frame::new(vec![0xFF, 0xD8], Instant::now(), 1);

        assert_eq!(link.send(&frame), SendOutcome::Dropped(DropReason::NotOpen));
        assert_eq!(link.stats().dropped, 1);
        assert_eq!(link.stats().queued, 0);
    }
}
