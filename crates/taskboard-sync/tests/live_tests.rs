//! Live channel behaviour against a local WebSocket server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;

use taskboard_sync::{
    connect_live, ChannelState, ChannelStatus, LiveConfig, LiveEvent, ReconnectPolicy,
};

const WAIT: Duration = Duration::from_secs(5);

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address with nothing listening on it.
async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        max_attempts,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<LiveEvent>) -> LiveEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for live event")
        .expect("live event stream closed")
}

async fn next_data(rx: &mut mpsc::Receiver<LiveEvent>) -> LiveEvent {
    loop {
        match next_event(rx).await {
            LiveEvent::Status(_) => continue,
            other => return other,
        }
    }
}

async fn next_status(rx: &mut mpsc::Receiver<LiveEvent>) -> ChannelStatus {
    loop {
        if let LiveEvent::Status(status) = next_event(rx).await {
            return status;
        }
    }
}

/// Send the scripted frames, then hold the socket open until the client leaves.
async fn play(mut socket: WebSocket, frames: Vec<String>) {
    for frame in frames {
        if socket.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

fn scripted(frames: Vec<String>) -> Router {
    Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let frames = frames.clone();
            async move { ws.on_upgrade(move |socket| play(socket, frames)) }
        }),
    )
}

#[tokio::test]
async fn test_update_frames_become_events() {
    let addr = serve(scripted(vec![
        r#"{"type":"update"}"#.into(),
        "{not json".into(),
        r#"{"type":"update","changes":{"Proj::A":{"Done":5}}}"#.into(),
        r#"{"type":"pong"}"#.into(),
        r#"{"type":"update","charts":[{"title":"Proj::B","slot":2,"data":[]}]}"#.into(),
    ]))
    .await;

    let (tx, mut rx) = mpsc::channel(32);
    let handle = connect_live(
        LiveConfig::new(format!("ws://{addr}/ws")).with_policy(fast_policy(3)),
        tx,
    );

    assert_eq!(next_status(&mut rx).await.state, ChannelState::Connecting);
    assert_eq!(next_status(&mut rx).await.state, ChannelState::Connected);

    assert_eq!(next_data(&mut rx).await, LiveEvent::Refetch);
    match next_data(&mut rx).await {
        LiveEvent::Diff(changes) => assert_eq!(changes["Proj::A"]["Done"], 5),
        other => panic!("expected diff, got {other:?}"),
    }
    match next_data(&mut rx).await {
        LiveEvent::Replace(items) => assert_eq!(items[0].title, "Proj::B"),
        other => panic!("expected replace, got {other:?}"),
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn test_server_close_triggers_reconnect() {
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let counter = counter.clone();
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = socket
                        .send(Message::Text(r#"{"type":"update"}"#.into()))
                        .await;
                    let _ = socket.send(Message::Close(None)).await;
                })
            }
        }),
    );
    let addr = serve(app).await;

    let (tx, mut rx) = mpsc::channel(32);
    let handle = connect_live(
        LiveConfig::new(format!("ws://{addr}/ws")).with_policy(fast_policy(5)),
        tx,
    );

    assert_eq!(next_data(&mut rx).await, LiveEvent::Refetch);
    assert_eq!(next_data(&mut rx).await, LiveEvent::Refetch);
    assert!(connections.load(Ordering::SeqCst) >= 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_backoff_exhaustion_and_manual_reconnect() {
    let addr = dead_addr().await;
    let (tx, mut rx) = mpsc::channel(32);
    let handle = connect_live(
        LiveConfig::new(format!("ws://{addr}/ws")).with_policy(fast_policy(2)),
        tx,
    );

    let mut retries = Vec::new();
    let exhausted = loop {
        let status = next_status(&mut rx).await;
        if status.exhausted {
            break status;
        }
        if let Some(ms) = status.retry_in_ms {
            retries.push((status.attempt, ms));
        }
    };
    assert_eq!(retries, vec![(1, 20), (2, 40)]);
    assert_eq!(exhausted.state, ChannelState::Disconnected);
    assert_eq!(exhausted.retry_in_ms, None);

    // Nothing further happens on its own.
    assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .is_err());

    handle.reconnect().await.unwrap();
    let status = next_status(&mut rx).await;
    assert_eq!(status.state, ChannelState::Connecting);
    assert_eq!(status.attempt, 0);
    assert!(!status.exhausted);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_pending_reconnect() {
    let addr = dead_addr().await;
    let (tx, mut rx) = mpsc::channel(32);
    let policy = ReconnectPolicy {
        base_delay: Duration::from_secs(30),
        max_delay: Duration::from_secs(60),
        max_attempts: 5,
    };
    let handle = connect_live(LiveConfig::new(format!("ws://{addr}/ws")).with_policy(policy), tx);

    loop {
        if next_status(&mut rx).await.retry_in_ms.is_some() {
            break;
        }
    }

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown must not wait for the reconnect timer");
}

#[tokio::test]
async fn test_shutdown_with_undrained_events() {
    let frames = vec![r#"{"type":"update"}"#.to_string(); 50];
    let addr = serve(scripted(frames)).await;

    let (tx, rx) = mpsc::channel(2);
    let handle = connect_live(
        LiveConfig::new(format!("ws://{addr}/ws")).with_policy(fast_policy(3)),
        tx,
    );

    // Let the task fill the buffer and park on the next send.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!handle.is_finished());

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("a blocked event send must not hide the shutdown command");
    drop(rx);
}

#[tokio::test]
async fn test_keepalive_pings_are_sent() {
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel::<String>();
    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let ping_tx = ping_tx.clone();
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    while let Some(Ok(msg)) = socket.recv().await {
                        if let Message::Text(text) = msg {
                            let _ = ping_tx.send(text);
                            let _ = socket
                                .send(Message::Text(r#"{"type":"pong"}"#.into()))
                                .await;
                        }
                    }
                })
            }
        }),
    );
    let addr = serve(app).await;

    let (tx, mut rx) = mpsc::channel(32);
    let handle = connect_live(
        LiveConfig::new(format!("ws://{addr}/ws"))
            .with_policy(fast_policy(3))
            .with_keepalive(Some(Duration::from_millis(50))),
        tx,
    );

    let ping = tokio::time::timeout(WAIT, ping_rx.recv())
        .await
        .expect("no keepalive received")
        .unwrap();
    assert_eq!(ping, r#"{"type":"ping"}"#);

    // Pongs produce no data events.
    assert!(tokio::time::timeout(Duration::from_millis(150), next_data(&mut rx))
        .await
        .is_err());

    handle.shutdown().await;
}
