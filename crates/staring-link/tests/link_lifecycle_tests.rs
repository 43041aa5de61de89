//! Integration tests for the classifier link against an in-process server.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use staring_classifier_contract::AttentionStatus;
use staring_core::Frame;
use staring_link::{
    DropReason, LinkError, LinkEvent, LinkEventReceiver, LinkState, SendOutcome, StreamLink,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Accepts one client, pushes `script`, then records binary frames until the
/// client closes.
async fn spawn_classifier(script: Vec<Message>) -> (String, JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener should have address");

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("client should connect");
        let mut socket = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed");

        for message in script {
            socket.send(message).await.expect("script send should succeed");
        }

        let mut received = Vec::new();
        while let Some(Ok(message)) = socket.next().await {
            match message {
                Message::Binary(payload) => received.push(payload),
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    });

    (format!("ws://{address}/ws/video"), handle)
}

/// Accepts one TCP client and never answers the WebSocket handshake.
async fn spawn_silent_server() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener should have address");

    let handle = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.expect("client should connect");
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    (format!("ws://{address}/ws/video"), handle)
}

async fn expect_ready(events: &mut LinkEventReceiver) {
    assert_eq!(
        timeout(WAIT, events.recv()).await.expect("ready should arrive"),
        Some(LinkEvent::Ready)
    );
}

#[tokio::test]
async fn link_lifecycle_tests_ready_is_first_event() {
    let (endpoint, server) = spawn_classifier(Vec::new()).await;
    let mut link = StreamLink::new();

    let mut events = link.connect(&endpoint).expect("connect should start");
    assert_eq!(link.state(), LinkState::Connecting);

    expect_ready(&mut events).await;
    assert_eq!(link.state(), LinkState::Open);

    link.close();
    assert_eq!(link.state(), LinkState::Disconnected);
    timeout(WAIT, server).await.expect("server should finish").expect("server task");
}

#[tokio::test]
async fn link_lifecycle_tests_connect_returns_before_the_handshake() {
    let (endpoint, server) = spawn_silent_server().await;
    let mut link = StreamLink::with_connect_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let mut events = link.connect(&endpoint).expect("connect should start");
    assert!(started.elapsed() < Duration::from_millis(100));

    let frame = Frame::new(vec![0xFF, 0xD8], Instant::now(), 1);
    assert_eq!(link.send(&frame), SendOutcome::Dropped(DropReason::NotOpen));

    let failed = timeout(WAIT, events.recv()).await.expect("failure should arrive");
    assert!(
        matches!(failed, Some(LinkEvent::ConnectFailed { ref reason }) if reason.contains("timed out")),
        "unexpected event {failed:?}"
    );
    assert_eq!(link.state(), LinkState::Disconnected);
    server.abort();
}

#[tokio::test]
async fn link_lifecycle_tests_close_while_connecting_is_immediate() {
    let (endpoint, server) = spawn_silent_server().await;
    let mut link = StreamLink::with_connect_timeout(Duration::from_secs(10));
    let mut events = link.connect(&endpoint).expect("connect should start");

    let started = Instant::now();
    link.close();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(link.state(), LinkState::Disconnected);

    let next = timeout(WAIT, events.recv()).await.expect("channel should close");
    assert_eq!(next, None);
    server.abort();
}

#[tokio::test]
async fn link_lifecycle_tests_malformed_messages_are_skipped() {
    let (endpoint, server) = spawn_classifier(vec![
        Message::Text("not json".to_string()),
        Message::Text(r#"{"error":"No face detected"}"#.to_string()),
        Message::Text(r#"{"status":"Distracted","eye_aspect_ratio":0.12}"#.to_string()),
    ])
    .await;
    let mut link = StreamLink::new();
    let mut events = link.connect(&endpoint).expect("connect should start");

    expect_ready(&mut events).await;
    let next = timeout(WAIT, events.recv())
        .await
        .expect("classification should arrive");
    match next {
        Some(LinkEvent::Classification(event)) => {
            assert_eq!(event.status, AttentionStatus::Distracted);
            assert_eq!(event.eye_aspect_ratio, Some(0.12));
        }
        other => panic!("expected classification, got {other:?}"),
    }

    let stats = link.stats();
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.received, 1);

    link.close();
    timeout(WAIT, server).await.expect("server should finish").expect("server task");
}

#[tokio::test]
async fn link_lifecycle_tests_frames_reach_the_classifier_as_binary() {
    let (endpoint, server) = spawn_classifier(Vec::new()).await;
    let mut link = StreamLink::new();
    let mut events = link.connect(&endpoint).expect("connect should start");
    expect_ready(&mut events).await;

    let frame = Frame::new(vec![0xFF, 0xD8, 0x01, 0x02], Instant::now(), 1);
    assert_eq!(link.send(&frame), SendOutcome::Queued);

    link.close();
    let received = timeout(WAIT, server)
        .await
        .expect("server should finish")
        .expect("server task");
    assert_eq!(received, vec![vec![0xFF, 0xD8, 0x01, 0x02]]);
    assert_eq!(link.stats().queued, 1);
}

#[tokio::test]
async fn link_lifecycle_tests_remote_close_emits_closed_event() {
    let (endpoint, server) = spawn_classifier(vec![Message::Close(None)]).await;
    let mut link = StreamLink::new();
    let mut events = link.connect(&endpoint).expect("connect should start");

    expect_ready(&mut events).await;
    let closed = timeout(WAIT, events.recv()).await.expect("close should arrive");
    assert!(matches!(closed, Some(LinkEvent::Closed { .. })));
    assert_eq!(link.state(), LinkState::Disconnected);

    let frame = Frame::new(vec![0xFF, 0xD8], Instant::now(), 2);
    assert_eq!(link.send(&frame), SendOutcome::Dropped(DropReason::NotOpen));

    link.close();
    let _ = timeout(WAIT, server).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn link_lifecycle_tests_immediate_remote_close_is_never_lost() {
    for _ in 0..20 {
        let (endpoint, server) = spawn_classifier(vec![Message::Close(None)]).await;
        let mut link = StreamLink::new();
        let mut events = link.connect(&endpoint).expect("connect should start");

        expect_ready(&mut events).await;
        let closed = timeout(WAIT, events.recv()).await.expect("close should arrive");
        assert!(matches!(closed, Some(LinkEvent::Closed { .. })));
        assert_eq!(link.state(), LinkState::Disconnected);

        link.close();
        let _ = timeout(WAIT, server).await;
    }
}

#[tokio::test]
async fn link_lifecycle_tests_connect_failure_leaves_link_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener should have address");
    drop(listener);

    let mut link = StreamLink::with_connect_timeout(Duration::from_secs(2));
    let mut events = link
        .connect(&format!("ws://{address}/ws/video"))
        .expect("connect should start");

    let failed = timeout(WAIT, events.recv()).await.expect("failure should arrive");
    assert!(matches!(failed, Some(LinkEvent::ConnectFailed { .. })));
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(timeout(WAIT, events.recv()).await.expect("channel should close"), None);
}

#[tokio::test]
async fn link_lifecycle_tests_rejects_non_websocket_endpoint() {
    let mut link = StreamLink::new();
    let error = link
        .connect("http://localhost:8000/ws/video")
        .expect_err("http endpoint should fail");

    assert!(matches!(error, LinkError::InvalidEndpoint(_)));
    assert_eq!(link.state(), LinkState::Disconnected);
}
