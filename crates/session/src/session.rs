//! Endpoint session: one actor task per coordinator URL.
//!
//! The actor owns the WebSocket lifecycle end to end: dialing with a connect
//! timeout, the heartbeat/liveness probe, reconnect scheduling through
//! [`BackoffPolicy`], and the manual disconnect/reconnect overrides. All
//! mutable session state lives inside the task, so transitions are strictly
//! sequential; the [`EndpointSession`] handle only sends commands and reads
//! snapshots.

use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_util::sync::CancellationToken;

use tg_protocol::{JsonRpcRequest, Message, RequestId, CLOSE_CODE_REJECTED};

use crate::backoff::BackoffPolicy;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection lifecycle state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Emitted by the session actor toward the gateway's event pump.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A decodable inbound text frame (heartbeat replies are consumed
    /// in-session and never surface here).
    Frame { endpoint: String, text: String },
    /// The session moved to a new lifecycle state.
    StateChanged {
        endpoint: String,
        state: ConnectionState,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a connect attempt is already in progress")]
    AlreadyConnecting,
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("session task has stopped")]
    Stopped,
}

/// Per-endpoint configuration carried into the actor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub backoff: BackoffPolicy,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SessionShared {
    /// Sender for outbound frames; present iff a connection is live.
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    reconnect_attempt: AtomicU32,
    last_error: RwLock<Option<String>>,
}

enum Command {
    Connect,
    Disconnect,
    Reconnect,
}

/// Handle to a running session actor. Cloning shares the same actor.
#[derive(Clone)]
pub struct EndpointSession {
    url: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    shared: Arc<SessionShared>,
}

impl EndpointSession {
    /// Spawn the actor task for one endpoint. Inbound frames and state
    /// changes are delivered on `events`; cancelling `shutdown` tears the
    /// session down from any state.
    pub fn spawn(
        config: SessionConfig,
        events: mpsc::Sender<SessionEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(SessionShared {
            outbound: RwLock::new(None),
            reconnect_attempt: AtomicU32::new(0),
            last_error: RwLock::new(None),
        });

        let actor = SessionActor {
            config: config.clone(),
            events,
            shared: shared.clone(),
            state_tx,
            cmd_rx,
            shutdown,
            manual_disconnect: false,
            attempt: 0,
        };
        tokio::spawn(actor.run());

        Self {
            url: config.url,
            cmd_tx,
            state_rx,
            shared,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// A watch receiver for awaiting state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Consecutive failed reconnect attempts; zero after a successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.reconnect_attempt.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.read().clone()
    }

    /// Begin connecting. Legal only from `Disconnected` or `Failed`.
    pub fn connect(&self) -> Result<(), SessionError> {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                return Err(SessionError::AlreadyConnecting)
            }
            ConnectionState::Connected => return Err(SessionError::AlreadyConnected),
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }
        self.cmd_tx
            .send(Command::Connect)
            .map_err(|_| SessionError::Stopped)
    }

    /// Manual disconnect: suppresses auto-reconnect and cancels any pending
    /// reconnect timer.
    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.cmd_tx
            .send(Command::Disconnect)
            .map_err(|_| SessionError::Stopped)
    }

    /// Manual override: cancel any pending timer, reset the attempt counter
    /// and the manual-disconnect flag, and connect immediately.
    pub fn reconnect(&self) -> Result<(), SessionError> {
        self.cmd_tx
            .send(Command::Reconnect)
            .map_err(|_| SessionError::Stopped)
    }

    /// Queue one outbound text frame. Fails unless currently connected.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let guard = self.shared.outbound.read();
        let tx = guard.as_ref().ok_or(SessionError::NotConnected)?;
        tx.send(text.into()).map_err(|_| SessionError::NotConnected)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Actor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How one connection attempt (or live connection) ended.
enum Disposition {
    /// User asked for it; terminal `Disconnected`, no reconnect.
    Manual,
    /// Remote closed with the permanent-rejection code; terminal `Failed`.
    Rejected(String),
    /// `reconnect()` while live: drop and redial immediately, attempt reset.
    ReconnectNow,
    /// Anything else: drives the backoff/reconnect path.
    Error(String),
}

struct SessionActor {
    config: SessionConfig,
    events: mpsc::Sender<SessionEvent>,
    shared: Arc<SessionShared>,
    state_tx: watch::Sender<ConnectionState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
    manual_disconnect: bool,
    attempt: u32,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.set_state(ConnectionState::Disconnected).await;
                    return;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return,
                    Some(Command::Connect) => self.run_cycle().await,
                    Some(Command::Reconnect) => {
                        self.set_attempt(0);
                        self.manual_disconnect = false;
                        self.run_cycle().await;
                    }
                    // Already disconnected; nothing to tear down.
                    Some(Command::Disconnect) => {}
                },
            }
            if self.shutdown.is_cancelled() {
                self.set_state(ConnectionState::Disconnected).await;
                return;
            }
        }
    }

    /// One full connect/reconnect cycle. Returns once the session reaches a
    /// terminal state (`Disconnected` after manual action, or `Failed`).
    async fn run_cycle(&mut self) {
        self.manual_disconnect = false;
        loop {
            self.set_state(ConnectionState::Connecting).await;

            // `connect_and_run` borrows the whole actor, so the cancel arm
            // has to watch a clone of the token.
            let shutdown = self.shutdown.clone();
            let disposition = tokio::select! {
                _ = shutdown.cancelled() => Disposition::Manual,
                d = self.connect_and_run() => d,
            };
            // Connection teardown before the next transition: drop the
            // outbound sender so no frame can race into a stale socket.
            *self.shared.outbound.write() = None;

            match disposition {
                Disposition::Manual => {
                    tracing::info!(endpoint = %self.config.url, "disconnected");
                    self.set_state(ConnectionState::Disconnected).await;
                    return;
                }
                Disposition::Rejected(reason) => {
                    tracing::error!(
                        endpoint = %self.config.url,
                        reason = %reason,
                        "endpoint rejected the session permanently, not reconnecting"
                    );
                    self.set_error(reason);
                    self.set_state(ConnectionState::Failed).await;
                    return;
                }
                Disposition::ReconnectNow => {
                    self.set_attempt(0);
                    continue;
                }
                Disposition::Error(reason) => {
                    self.set_error(reason.clone());
                    if self.manual_disconnect {
                        // disconnect() landed while the close was in flight.
                        self.set_state(ConnectionState::Disconnected).await;
                        return;
                    }
                    // Checked before incrementing: a budget of N permits N
                    // scheduled reconnects after the initial failure.
                    if self.config.backoff.should_give_up(self.attempt) {
                        tracing::error!(
                            endpoint = %self.config.url,
                            attempts = self.attempt,
                            "max reconnect attempts exhausted"
                        );
                        self.set_state(ConnectionState::Failed).await;
                        return;
                    }
                    self.set_attempt(self.attempt + 1);

                    let delay = self.config.backoff.reconnect_delay(self.attempt);
                    tracing::warn!(
                        endpoint = %self.config.url,
                        error = %reason,
                        attempt = self.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "connection lost, reconnecting"
                    );
                    self.set_state(ConnectionState::Reconnecting).await;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.cancelled() => {
                            self.set_state(ConnectionState::Disconnected).await;
                            return;
                        }
                        cmd = self.cmd_rx.recv() => match cmd {
                            Some(Command::Disconnect) | None => {
                                // Cancels the pending reconnect timer.
                                self.set_state(ConnectionState::Disconnected).await;
                                return;
                            }
                            Some(Command::Reconnect) => {
                                self.set_attempt(0);
                            }
                            // connect() is rejected handle-side while
                            // reconnecting; treat a racer as "retry now".
                            Some(Command::Connect) => {}
                        },
                    }
                }
            }
        }
    }

    /// Dial, then run the connected message loop with heartbeat.
    async fn connect_and_run(&mut self) -> Disposition {
        let dial = tokio_tungstenite::connect_async(&self.config.url);
        let ws = match tokio::time::timeout(self.config.connect_timeout, dial).await {
            Err(_) => return Disposition::Error("connect timeout".into()),
            Ok(Err(e)) => return Disposition::Error(e.to_string()),
            Ok(Ok((ws, _response))) => ws,
        };

        // Successful open: counter and backoff restart from scratch.
        self.set_attempt(0);
        *self.shared.last_error.write() = None;
        self.set_state(ConnectionState::Connected).await;
        tracing::info!(endpoint = %self.config.url, "connected");

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        *self.shared.outbound.write() = Some(outbound_tx);

        let mut hb_interval = tokio::time::interval(self.config.heartbeat_interval);
        hb_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // probe happens one full interval after open.
        hb_interval.tick().await;

        // Invariant: the timeout deadline is armed iff a probe is outstanding.
        let mut hb_pending: Option<RequestId> = None;
        let mut hb_deadline: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(WsFrame::Close(None)).await;
                    return Disposition::Manual;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Disconnect) | None => {
                        // Flag first so the close path takes the terminal
                        // branch even if the remote races us with an error.
                        self.manual_disconnect = true;
                        let _ = sink.send(WsFrame::Close(None)).await;
                        return Disposition::Manual;
                    }
                    Some(Command::Reconnect) => {
                        let _ = sink.send(WsFrame::Close(None)).await;
                        return Disposition::ReconnectNow;
                    }
                    Some(Command::Connect) => {
                        // Rejected handle-side; nothing to do while live.
                    }
                },
                _ = hb_interval.tick() => {
                    if hb_pending.is_none() {
                        let id = RequestId::Str(format!("hb:{}", uuid::Uuid::new_v4()));
                        let req = JsonRpcRequest::new(id.clone(), "ping", None);
                        let json = match serde_json::to_string(&req) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize heartbeat");
                                continue;
                            }
                        };
                        if sink.send(WsFrame::Text(json)).await.is_err() {
                            return Disposition::Error("send failed during heartbeat".into());
                        }
                        hb_pending = Some(id);
                        hb_deadline =
                            Some(Box::pin(tokio::time::sleep(self.config.heartbeat_timeout)));
                    }
                }
                _ = async {
                    match hb_deadline.as_mut() {
                        Some(deadline) => deadline.await,
                        None => std::future::pending().await,
                    }
                } => {
                    // Forcible termination, not a graceful close: drop the
                    // socket and let the error path drive reconnection.
                    tracing::warn!(
                        endpoint = %self.config.url,
                        "liveness probe timed out, terminating connection"
                    );
                    return Disposition::Error("heartbeat timeout".into());
                }
                frame = outbound_rx.recv() => {
                    if let Some(text) = frame {
                        if sink.send(WsFrame::Text(text)).await.is_err() {
                            return Disposition::Error("send failed".into());
                        }
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(WsFrame::Text(text))) => {
                        if let Some(id) = heartbeat_reply_id(&text) {
                            // A reply with no outstanding probe is a no-op.
                            if hb_pending.as_ref() == Some(&id) {
                                hb_pending = None;
                                hb_deadline = None;
                            }
                        } else {
                            let event = SessionEvent::Frame {
                                endpoint: self.config.url.clone(),
                                text,
                            };
                            if self.events.send(event).await.is_err() {
                                return Disposition::Manual;
                            }
                        }
                    }
                    Some(Ok(WsFrame::Ping(payload))) => {
                        let _ = sink.send(WsFrame::Pong(payload)).await;
                    }
                    Some(Ok(WsFrame::Close(frame))) => {
                        let (code, reason) = match &frame {
                            Some(f) => (u16::from(f.code), f.reason.to_string()),
                            None => (1005, String::new()),
                        };
                        if self.manual_disconnect {
                            return Disposition::Manual;
                        }
                        if code == CLOSE_CODE_REJECTED {
                            return Disposition::Rejected(format!(
                                "close {code}: {reason}"
                            ));
                        }
                        return Disposition::Error(format!("closed with code {code}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if self.manual_disconnect {
                            return Disposition::Manual;
                        }
                        return Disposition::Error(e.to_string());
                    }
                    None => {
                        if self.manual_disconnect {
                            return Disposition::Manual;
                        }
                        return Disposition::Error("connection closed".into());
                    }
                },
            }
        }
    }

    async fn set_state(&mut self, state: ConnectionState) {
        let changed = {
            let current = *self.state_tx.borrow();
            current != state
        };
        if changed {
            let _ = self.state_tx.send(state);
            let _ = self
                .events
                .send(SessionEvent::StateChanged {
                    endpoint: self.config.url.clone(),
                    state,
                })
                .await;
        }
    }

    fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
        self.shared.reconnect_attempt.store(attempt, Ordering::SeqCst);
    }

    fn set_error(&mut self, error: String) {
        *self.shared.last_error.write() = Some(error);
    }
}

/// If `text` is a JSON-RPC response to one of our liveness probes, return
/// its id. Probe ids live in a dedicated `hb:` namespace so they can never
/// collide with router-assigned ids.
fn heartbeat_reply_id(text: &str) -> Option<RequestId> {
    if !text.contains("\"hb:") {
        return None;
    }
    match Message::parse(text) {
        Ok(Message::Response(resp)) => match &resp.id {
            RequestId::Str(s) if s.starts_with("hb:") => Some(resp.id.clone()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_reply_id_matches_only_probe_responses() {
        let reply = r#"{"jsonrpc":"2.0","id":"hb:abc","result":{}}"#;
        assert_eq!(heartbeat_reply_id(reply), Some(RequestId::Str("hb:abc".into())));

        // Requests in the hb namespace are not replies.
        let req = r#"{"jsonrpc":"2.0","id":"hb:abc","method":"ping"}"#;
        assert_eq!(heartbeat_reply_id(req), None);

        // Ordinary responses pass through to the router.
        let other = r#"{"jsonrpc":"2.0","id":7,"result":{}}"#;
        assert_eq!(heartbeat_reply_id(other), None);
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
