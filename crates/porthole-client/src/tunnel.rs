//! Tunnel connection state machine
//!
//! Owns the persistent WebSocket to the edge, the per-stream reassembly
//! table, the heartbeat timers, and the reconnect/backoff loop. All frame
//! handling and timer events are serialized onto one task; only the local
//! origin call runs on its own task, so streams for other ids keep flowing
//! while a request waits on the origin.

use crate::config::TunnelConfig;
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use porthole_proto::head::{decode_open_stream, encode_response_headers, RequestHead};
use porthole_proto::{Frame, FrameType, StreamId, FRAME_HEADER_LEN};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Reconnect delays indexed by attempt count; the last entry repeats.
const BACKOFF: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Consecutive missed pongs before the connection is declared dead. One lost
/// heartbeat message alone does not force a reconnect.
const HEARTBEAT_FAILURES_BEFORE_CLOSE: u32 = 2;

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF[(attempt as usize).min(BACKOFF.len() - 1)]
}

/// Tunnel client errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("tunnel closed")]
    Closed,

    #[error("invalid edge URL: {0}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("local origin error: {0}")]
    Origin(#[from] reqwest::Error),

    #[error("invalid request method: {0:?}")]
    Method(String),
}

/// Connection lifecycle as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Reassembly state for one in-flight exchange. Owned by the connection that
/// created it and discarded wholesale when that connection drops.
struct PendingStream {
    open_payload: Bytes,
    body_chunks: Vec<Bytes>,
}

/// Tunnel client: one persistent edge connection per instance
pub struct TunnelClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: TunnelConfig,
    http: reqwest::Client,
    /// Operator intent: keep trying to be connected
    should_run: AtomicBool,
    /// Set once by `close()`; the client never leaves `Closed`
    closed: AtomicBool,
    loop_spawned: Mutex<bool>,
    state_tx: watch::Sender<TunnelState>,
    shutdown: Notify,
}

impl TunnelClient {
    pub fn new(config: TunnelConfig) -> Self {
        let (state_tx, _) = watch::channel(TunnelState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                http: reqwest::Client::new(),
                should_run: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                loop_spawned: Mutex::new(false),
                state_tx,
                shutdown: Notify::new(),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> TunnelState {
        *self.inner.state_tx.borrow()
    }

    /// Open the tunnel and resolve once the first connection is up.
    ///
    /// Idempotent: concurrent and repeated calls share the same in-flight
    /// attempt instead of opening a second connection. Later reconnects do
    /// not re-signal earlier callers; they only emit status messages.
    pub async fn connect(&self) -> Result<(), TunnelError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TunnelError::Closed);
        }
        self.inner.should_run.store(true, Ordering::SeqCst);

        let mut state_rx = self.inner.state_tx.subscribe();
        {
            let mut spawned = self
                .inner
                .loop_spawned
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !*spawned {
                *spawned = true;
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.run_loop().await });
            }
        }

        loop {
            match *state_rx.borrow_and_update() {
                TunnelState::Connected => return Ok(()),
                TunnelState::Closed => return Err(TunnelError::Closed),
                _ => {}
            }
            if state_rx.changed().await.is_err() {
                return Err(TunnelError::Closed);
            }
        }
    }

    /// Close the tunnel permanently. Cancels the reconnect and heartbeat
    /// timers and drops the socket; a close event for the just-closed socket
    /// arriving afterwards does not schedule a reconnect.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.should_run.store(false, Ordering::SeqCst);

        let spawned = *self
            .inner
            .loop_spawned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !spawned {
            self.inner.state_tx.send_replace(TunnelState::Closed);
        }
        self.inner.shutdown.notify_one();
    }
}

impl Inner {
    fn should_run(&self) -> bool {
        self.should_run.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: TunnelState) {
        self.state_tx.send_replace(state);
    }

    fn status(&self, message: &str) {
        debug!("{message}");
        if let Some(callback) = &self.config.on_status {
            callback(message);
        }
    }

    async fn run_loop(self: Arc<Self>) {
        let mut reconnect_attempt: u32 = 0;

        while self.should_run() {
            self.set_state(TunnelState::Connecting);
            match self.open_socket().await {
                Ok(socket) => {
                    reconnect_attempt = 0;
                    self.set_state(TunnelState::Connected);
                    self.status("Tunnel connected.");
                    self.run_connection(socket).await;
                }
                Err(err) => {
                    self.status(&format!("Tunnel error: {err}"));
                }
            }

            if !self.should_run() {
                break;
            }

            let delay = backoff_delay(reconnect_attempt);
            reconnect_attempt += 1;
            self.set_state(TunnelState::Reconnecting);
            self.status(&format!(
                "Tunnel disconnected. Reconnecting in {}s...",
                delay.as_secs()
            ));
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.notified() => break,
            }
        }

        self.set_state(TunnelState::Closed);
    }

    async fn open_socket(&self) -> Result<WsStream, TunnelError> {
        let url = ws_url(&self.config.edge_url);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TunnelError::InvalidUrl(err.to_string()))?;

        let bearer = format!("Bearer {}", self.config.session_token);
        let bearer = HeaderValue::from_str(&bearer)
            .map_err(|_| TunnelError::InvalidUrl("session token is not header-safe".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(socket)
    }

    /// Drive one established connection until it drops or the client closes.
    async fn run_connection(&self, socket: WsStream) {
        let (mut sink, mut source) = socket.split();

        // Response frames from dispatch tasks funnel through this channel so
        // the sink stays owned by the connection task. Dropping the receiver
        // on disconnect makes late sends silent no-ops: frames are never
        // queued across reconnects.
        let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(64);

        let mut pending: HashMap<StreamId, PendingStream> = HashMap::new();
        let mut heartbeat_failures: u32 = 0;
        let mut pong_deadline: Option<Instant> = None;

        let mut ping = tokio::time::interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }

                Some(frame) = frame_rx.recv() => {
                    if send_frame(&mut sink, frame).await.is_err() {
                        break;
                    }
                }

                _ = ping.tick() => {
                    if send_frame(&mut sink, Frame::control(FrameType::Ping)).await.is_err() {
                        break;
                    }
                    // Re-armed on every ping: a late pong only clears the
                    // most recent deadline.
                    pong_deadline = Some(Instant::now() + self.config.pong_timeout);
                }

                _ = deadline_elapsed(pong_deadline) => {
                    pong_deadline = None;
                    heartbeat_failures += 1;
                    debug!(failures = heartbeat_failures, "pong timeout");
                    if heartbeat_failures >= HEARTBEAT_FAILURES_BEFORE_CLOSE {
                        self.status("Heartbeat failed. Reconnecting...");
                        break;
                    }
                }

                message = source.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            self.on_frame(
                                &data,
                                &mut pending,
                                &frame_tx,
                                &mut heartbeat_failures,
                                &mut pong_deadline,
                            );
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            self.status(&format!("Tunnel error: {err}"));
                            break;
                        }
                    }
                }
            }
        }
        // `pending` dies here with the connection: in-flight requests from a
        // dropped connection are never completed.
    }

    /// Dispatch one inbound frame. Undecodable frames are dropped; a
    /// malformed frame must never take the connection down.
    fn on_frame(
        &self,
        data: &[u8],
        pending: &mut HashMap<StreamId, PendingStream>,
        frame_tx: &mpsc::Sender<Frame>,
        heartbeat_failures: &mut u32,
        pong_deadline: &mut Option<Instant>,
    ) {
        if data.len() < FRAME_HEADER_LEN {
            return;
        }
        let frame = match Frame::decode(Bytes::copy_from_slice(data)) {
            Ok(frame) => frame,
            Err(err) => {
                trace!("ignoring undecodable frame: {err}");
                return;
            }
        };

        match frame.frame_type {
            FrameType::Ping => {
                let _ = frame_tx.try_send(Frame::control(FrameType::Pong));
            }
            FrameType::Pong => {
                *heartbeat_failures = 0;
                *pong_deadline = None;
            }
            FrameType::OpenStream => {
                if !frame.payload.is_empty() {
                    pending.insert(
                        frame.stream_id,
                        PendingStream {
                            open_payload: frame.payload,
                            body_chunks: Vec::new(),
                        },
                    );
                }
            }
            FrameType::StreamData => {
                // frames for unknown or already-finalized streams are ignored
                if let Some(entry) = pending.get_mut(&frame.stream_id) {
                    entry.body_chunks.push(frame.payload);
                }
            }
            FrameType::StreamEnd => {
                if let Some(stream) = pending.remove(&frame.stream_id) {
                    let http = self.http.clone();
                    let local_port = self.config.local_port;
                    let frame_tx = frame_tx.clone();
                    tokio::spawn(forward_request(
                        http,
                        local_port,
                        frame.stream_id,
                        stream,
                        frame_tx,
                    ));
                }
            }
            FrameType::StreamCancel => {
                pending.remove(&frame.stream_id);
            }
            FrameType::ResponseHeaders
            | FrameType::WsUpgrade
            | FrameType::WsData
            | FrameType::WsClose => {
                trace!(frame_type = ?frame.frame_type, "unhandled frame type");
            }
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: Frame) -> Result<(), TunnelError> {
    sink.send(Message::Binary(frame.encode().to_vec()))
        .await
        .map_err(TunnelError::from)
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn ws_url(edge_url: &str) -> String {
    if let Some(rest) = edge_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = edge_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        edge_url.to_string()
    }
}

/// Forward one reassembled request to the local origin and emit the response
/// frames. An origin failure resolves only this stream with a synthetic 502;
/// the connection itself is untouched.
async fn forward_request(
    http: reqwest::Client,
    local_port: u16,
    stream_id: StreamId,
    stream: PendingStream,
    frame_tx: mpsc::Sender<Frame>,
) {
    let head = decode_open_stream(&stream.open_payload);

    let mut body = Vec::with_capacity(stream.body_chunks.iter().map(Bytes::len).sum());
    for chunk in &stream.body_chunks {
        body.extend_from_slice(chunk);
    }

    match call_origin(&http, local_port, &head, body).await {
        Ok((status, headers, response_body)) => {
            let payload = encode_response_headers(status, &headers);
            if frame_tx
                .send(Frame::new(FrameType::ResponseHeaders, stream_id, payload))
                .await
                .is_err()
            {
                return;
            }
            if !response_body.is_empty()
                && frame_tx
                    .send(Frame::new(FrameType::StreamData, stream_id, response_body))
                    .await
                    .is_err()
            {
                return;
            }
        }
        Err(err) => {
            debug!(stream_id, "local origin call failed: {err}");
            let mut headers = HashMap::new();
            headers.insert("content-type".to_string(), "text/plain".to_string());
            let payload = encode_response_headers(502, &headers);
            if frame_tx
                .send(Frame::new(FrameType::ResponseHeaders, stream_id, payload))
                .await
                .is_err()
            {
                return;
            }
            let body = Bytes::from(format!("Bad Gateway: {err}"));
            if frame_tx
                .send(Frame::new(FrameType::StreamData, stream_id, body))
                .await
                .is_err()
            {
                return;
            }
        }
    }

    let _ = frame_tx
        .send(Frame::new(FrameType::StreamEnd, stream_id, Bytes::new()))
        .await;
}

async fn call_origin(
    http: &reqwest::Client,
    local_port: u16,
    head: &RequestHead,
    body: Vec<u8>,
) -> Result<(u16, HashMap<String, String>, Bytes), TunnelError> {
    let method = reqwest::Method::from_bytes(head.method.as_bytes())
        .map_err(|_| TunnelError::Method(head.method.clone()))?;
    let url = format!("http://127.0.0.1:{local_port}{}", head.path);

    let mut request = http.request(method, &url);
    for (name, value) in &head.headers {
        // the body is re-buffered, so message framing is recomputed locally
        if matches!(
            name.as_str(),
            "content-length" | "transfer-encoding" | "connection"
        ) {
            continue;
        }
        request = request.header(name.as_str(), value.as_str());
    }

    let response = request.body(body).send().await?;

    let status = response.status().as_u16();
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).to_string();
        match headers.entry(name.as_str().to_string()) {
            Entry::Occupied(mut existing) => {
                // multi-valued headers collapse into one comma-joined line
                let joined = format!("{}, {}", existing.get(), value);
                existing.insert(joined);
            }
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
    }

    let response_body = response.bytes().await?;
    Ok((status, headers, response_body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_escalates_then_caps() {
        let delays: Vec<u64> = (0..6).map(|n| backoff_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 5, 10, 10, 10]);
    }

    #[test]
    fn test_ws_url_rewrites_http_schemes() {
        assert_eq!(ws_url("http://localhost:3002/tunnel"), "ws://localhost:3002/tunnel");
        assert_eq!(ws_url("https://edge.example.dev/tunnel"), "wss://edge.example.dev/tunnel");
        assert_eq!(ws_url("wss://edge.example.dev/tunnel"), "wss://edge.example.dev/tunnel");
    }

    #[tokio::test]
    async fn test_close_before_connect_is_terminal() {
        let client = TunnelClient::new(TunnelConfig::new(3000, "ws://127.0.0.1:1/tunnel", "t"));
        client.close();

        assert_eq!(client.state(), TunnelState::Closed);
        assert!(matches!(client.connect().await, Err(TunnelError::Closed)));
    }
}
