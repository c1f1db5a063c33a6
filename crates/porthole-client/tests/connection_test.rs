//! Connection lifecycle: idempotent connect, reconnect with backoff reset,
//! permanent close, and heartbeat-driven reconnects.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use porthole_client::{TunnelClient, TunnelConfig, TunnelState};
use porthole_proto::{Frame, FrameType};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type EdgeSocket = WebSocketStream<TcpStream>;

async fn spawn_edge() -> (String, tokio::sync::mpsc::Receiver<EdgeSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (socket_tx, socket_rx) = tokio::sync::mpsc::channel(4);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            if socket_tx.send(socket).await.is_err() {
                break;
            }
        }
    });
    (format!("ws://{addr}/tunnel"), socket_rx)
}

fn status_recorder() -> (Arc<Mutex<Vec<String>>>, porthole_client::StatusCallback) {
    let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let callback: porthole_client::StatusCallback = Arc::new(move |message: &str| {
        sink.lock().unwrap().push(message.to_string());
    });
    (messages, callback)
}

fn saw_status(messages: &Arc<Mutex<Vec<String>>>, needle: &str) -> bool {
    messages.lock().unwrap().iter().any(|m| m.contains(needle))
}

async fn wait_for_status(messages: &Arc<Mutex<Vec<String>>>, needle: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !saw_status(messages, needle) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "status {needle:?} never arrived; saw {:?}",
            messages.lock().unwrap()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Answer protocol pings with pongs, skipping the first `skip` of them.
fn pong_responder(mut edge: EdgeSocket, skip: usize) {
    tokio::spawn(async move {
        let mut seen = 0usize;
        while let Some(Ok(message)) = edge.next().await {
            if let Message::Binary(data) = message {
                let Ok(frame) = Frame::decode(Bytes::from(data)) else {
                    continue;
                };
                if frame.frame_type == FrameType::Ping {
                    seen += 1;
                    if seen > skip
                        && edge
                            .send(Message::Binary(
                                Frame::control(FrameType::Pong).encode().to_vec(),
                            ))
                            .await
                            .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });
}

#[tokio::test]
async fn concurrent_connects_share_one_socket() {
    let (edge_url, mut sockets) = spawn_edge().await;
    let client = TunnelClient::new(TunnelConfig::new(3000, &edge_url, "slug.token"));

    let (first, second) = tokio::join!(client.connect(), client.connect());
    first.unwrap();
    second.unwrap();
    assert_eq!(client.state(), TunnelState::Connected);

    let _edge = sockets.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sockets.try_recv().is_err(), "a second socket was opened");

    client.close();
}

#[tokio::test]
async fn reconnects_after_drop_and_resets_backoff() {
    let (edge_url, mut sockets) = spawn_edge().await;
    let (messages, callback) = status_recorder();
    let client = TunnelClient::new(
        TunnelConfig::new(3000, &edge_url, "slug.token").with_status_callback(callback),
    );
    client.connect().await.unwrap();

    let edge = sockets.recv().await.unwrap();
    drop(edge);

    wait_for_status(&messages, "Reconnecting in 1s").await;
    let edge = tokio::time::timeout(Duration::from_secs(5), sockets.recv())
        .await
        .expect("reconnect timed out")
        .unwrap();

    // a successful connection resets the backoff ladder
    wait_for_status(&messages, "Tunnel connected.").await;
    messages.lock().unwrap().clear();
    drop(edge);
    wait_for_status(&messages, "Reconnecting in 1s").await;

    client.close();
}

#[tokio::test]
async fn close_cancels_pending_reconnect() {
    let (edge_url, mut sockets) = spawn_edge().await;
    let client = TunnelClient::new(TunnelConfig::new(3000, &edge_url, "slug.token"));
    client.connect().await.unwrap();

    let edge = sockets.recv().await.unwrap();
    client.close();
    drop(edge);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(sockets.try_recv().is_err(), "reconnected after close");
    assert_eq!(client.state(), TunnelState::Closed);
    assert!(client.connect().await.is_err());
}

#[tokio::test]
async fn one_missed_pong_is_tolerated() {
    let (edge_url, mut sockets) = spawn_edge().await;
    let (messages, callback) = status_recorder();
    let client = TunnelClient::new(
        TunnelConfig::new(3000, &edge_url, "slug.token")
            .with_heartbeat(Duration::from_millis(60), Duration::from_millis(40))
            .with_status_callback(callback),
    );
    client.connect().await.unwrap();

    let edge = sockets.recv().await.unwrap();
    pong_responder(edge, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.state(), TunnelState::Connected);
    assert!(!saw_status(&messages, "Heartbeat failed"));

    client.close();
}

#[tokio::test]
async fn two_missed_pongs_force_a_reconnect() {
    let (edge_url, mut sockets) = spawn_edge().await;
    let (messages, callback) = status_recorder();
    let client = TunnelClient::new(
        TunnelConfig::new(3000, &edge_url, "slug.token")
            .with_heartbeat(Duration::from_millis(60), Duration::from_millis(40))
            .with_status_callback(callback),
    );
    client.connect().await.unwrap();

    // this connection never answers pings
    let _edge = sockets.recv().await.unwrap();

    wait_for_status(&messages, "Heartbeat failed. Reconnecting...").await;
    let replacement = tokio::time::timeout(Duration::from_secs(5), sockets.recv())
        .await
        .expect("reconnect timed out")
        .unwrap();
    pong_responder(replacement, 0);
    wait_for_status(&messages, "Tunnel connected.").await;

    client.close();
}
