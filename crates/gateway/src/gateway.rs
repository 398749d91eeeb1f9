//! Gateway facade: owns the endpoint registry, wires sessions to bridges
//! and the executor, and exposes connect/status/shutdown.
//!
//! All endpoint state lives in the registry built at construction and is
//! only mutated through gateway methods. Inbound traffic flows through one
//! event pump task; `tools/call` dispatch is spawned per call so a slow
//! tool never blocks message handling.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tg_bridge::{BridgeError, ProcessBridge};
use tg_domain::config::{Config, ConfigSeverity, Topology};
use tg_executor::{PerformanceMetrics, ServiceManager, ToolCallExecutor};
use tg_protocol::{
    initialize_result, JsonRpcRequest, JsonRpcResponse, Message, ToolsListResult,
    CODE_INTERNAL_ERROR, CODE_METHOD_NOT_FOUND, CODE_SERVICE_UNAVAILABLE,
};
use tg_session::{
    BackoffPolicy, ConnectionState, EndpointSession, SessionConfig, SessionError, SessionEvent,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors and status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("no connected endpoint available")]
    NoEndpointAvailable,

    #[error("call cancelled before a response arrived")]
    Cancelled,

    #[error("no response within {0} ms")]
    RequestTimeout(u64),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Point-in-time view of one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointStatus {
    pub url: String,
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
    pub last_error: Option<String>,
    /// Present only for endpoints backed by a local process.
    pub process_alive: Option<bool>,
    pub process_failures: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub endpoints: Vec<EndpointStatus>,
    pub any_connected: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct EndpointEntry {
    session: EndpointSession,
    bridge: Option<Arc<ProcessBridge>>,
}

struct Inner {
    topology: Topology,
    /// Configured endpoint order; round-robin cycles over this, never over
    /// the map's iteration order.
    order: Vec<String>,
    endpoints: HashMap<String, EndpointEntry>,
    router: crate::router::MessageRouter,
    executor: ToolCallExecutor,
    /// Deadline for locally-originated requests.
    request_timeout: std::time::Duration,
    shutdown: CancellationToken,
}

/// The gateway facade.
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    /// Build the endpoint registry and spawn the session actors and event
    /// pump. No connection is attempted until [`connect_all`](Self::connect_all).
    pub fn new(config: Config, manager: Arc<dyn ServiceManager>) -> Result<Self, GatewayError> {
        let errors: Vec<String> = config
            .validate()
            .into_iter()
            .filter(|issue| issue.severity == ConfigSeverity::Error)
            .map(|issue| issue.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(GatewayError::Config(errors.join("; ")));
        }

        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(256);

        let mut order = Vec::with_capacity(config.endpoints.len());
        let mut endpoints = HashMap::new();
        let mut bridge_pumps = Vec::new();

        for ep in &config.endpoints {
            let backoff =
                BackoffPolicy::from_config(&config.backoff).with_seed(seed_for(&ep.url));
            let session_config = SessionConfig {
                url: ep.url.clone(),
                connect_timeout: config.connection.connect_timeout(),
                heartbeat_interval: config.connection.heartbeat_interval(),
                heartbeat_timeout: config.connection.heartbeat_timeout(),
                backoff,
            };
            let session =
                EndpointSession::spawn(session_config, events_tx.clone(), shutdown.child_token());

            let bridge = ep.process.as_ref().map(|process| {
                let (output_tx, output_rx) = mpsc::channel::<String>(64);
                let bridge = Arc::new(ProcessBridge::new(
                    ep.url.clone(),
                    process.clone(),
                    config.process.clone(),
                    output_tx,
                ));
                bridge_pumps.push((session.clone(), output_rx));
                bridge
            });

            order.push(ep.url.clone());
            endpoints.insert(ep.url.clone(), EndpointEntry { session, bridge });
        }

        let inner = Arc::new(Inner {
            topology: config.routing.topology,
            order,
            endpoints,
            router: crate::router::MessageRouter::new(),
            executor: ToolCallExecutor::new(manager, config.tool_call),
            request_timeout: config.connection.request_timeout(),
            shutdown,
        });

        // Bridge stdout always returns to the endpoint that owns the
        // process; that is the whole point of the dedicated topology.
        for (session, mut output_rx) in bridge_pumps {
            let token = inner.shutdown.child_token();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        line = output_rx.recv() => match line {
                            None => break,
                            Some(line) => {
                                if let Err(e) = session.send(line) {
                                    tracing::warn!(
                                        endpoint = session.url(),
                                        error = %e,
                                        "dropping tool process output, endpoint not connected"
                                    );
                                }
                            }
                        },
                    }
                }
            });
        }

        tokio::spawn(event_pump(inner.clone(), events_rx));

        Ok(Self { inner })
    }

    /// Kick off connects for every configured endpoint and spawn dedicated
    /// tool processes. Returns once dispatched; does not wait for sessions
    /// to reach connected.
    pub async fn connect_all(&self) {
        for url in &self.inner.order {
            let entry = &self.inner.endpoints[url];
            if let Some(bridge) = &entry.bridge {
                if !bridge.is_alive() {
                    match bridge.spawn().await {
                        Ok(()) | Err(BridgeError::AlreadyRunning) => {}
                        Err(e) => {
                            tracing::error!(endpoint = %url, error = %e, "tool process spawn failed");
                        }
                    }
                }
            }
            match entry.session.connect() {
                Ok(())
                | Err(SessionError::AlreadyConnected)
                | Err(SessionError::AlreadyConnecting) => {}
                Err(e) => tracing::error!(endpoint = %url, error = %e, "connect dispatch failed"),
            }
        }
    }

    pub fn status(&self) -> GatewayStatus {
        let endpoints: Vec<EndpointStatus> = self
            .inner
            .order
            .iter()
            .map(|url| {
                let entry = &self.inner.endpoints[url];
                EndpointStatus {
                    url: url.clone(),
                    state: entry.session.state(),
                    reconnect_attempt: entry.session.reconnect_attempt(),
                    last_error: entry.session.last_error(),
                    process_alive: entry.bridge.as_ref().map(|b| b.is_alive()),
                    process_failures: entry.bridge.as_ref().map(|b| b.consecutive_failures()),
                }
            })
            .collect();
        let any_connected = endpoints
            .iter()
            .any(|e| e.state == ConnectionState::Connected);
        GatewayStatus {
            endpoints,
            any_connected,
        }
    }

    /// Manually disconnect one endpoint; it stays down until
    /// [`reconnect`](Self::reconnect).
    pub fn disconnect(&self, url: &str) -> Result<(), GatewayError> {
        let entry = self.entry(url)?;
        entry.session.disconnect()?;
        Ok(())
    }

    /// Manual reconnect override: resets the attempt counter and dials
    /// immediately, even from the failed state.
    pub fn reconnect(&self, url: &str) -> Result<(), GatewayError> {
        let entry = self.entry(url)?;
        entry.session.reconnect()?;
        Ok(())
    }

    /// Re-arm a dead tool process whose restart budget is exhausted.
    pub async fn reset_bridge(&self, url: &str) -> Result<(), GatewayError> {
        let entry = self.entry(url)?;
        let bridge = entry
            .bridge
            .as_ref()
            .ok_or_else(|| GatewayError::UnknownEndpoint(format!("{url} has no tool process")))?;
        bridge.reset_restarts();
        if !bridge.is_alive() {
            bridge.respawn(0).await?;
        }
        Ok(())
    }

    /// Send a locally-originated request, assigned to a connected endpoint
    /// by round-robin, and await the matching response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, GatewayError> {
        let candidates: Vec<(String, bool)> = self
            .inner
            .order
            .iter()
            .map(|url| {
                (
                    url.clone(),
                    self.inner.endpoints[url].session.is_connected(),
                )
            })
            .collect();
        let endpoint = self
            .inner
            .router
            .pick(&candidates)
            .ok_or(GatewayError::NoEndpointAvailable)?;

        let id = self.inner.router.next_request_id();
        let rx = self.inner.router.register(id.clone(), &endpoint, method);
        let frame = serde_json::to_string(&JsonRpcRequest::new(id.clone(), method, params))?;

        let entry = self.entry(&endpoint)?;
        if let Err(e) = entry.session.send(frame) {
            self.inner.router.forget(&id);
            return Err(e.into());
        }
        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(GatewayError::Cancelled),
            Err(_) => {
                // Abandon the call; a late response becomes a router no-op.
                self.inner.router.forget(&id);
                let timeout_ms = self.inner.request_timeout.as_millis() as u64;
                tracing::warn!(endpoint = %endpoint, id = %id, method, timeout_ms, "request timed out");
                Err(GatewayError::RequestTimeout(timeout_ms))
            }
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.inner.executor.metrics()
    }

    pub fn pending_calls(&self) -> usize {
        self.inner.router.pending_count()
    }

    /// Tear everything down: stop sessions, reject outstanding calls, and
    /// terminate owned processes (gracefully, then forced).
    pub async fn shutdown(&self) {
        tracing::info!("gateway shutting down");
        self.inner.shutdown.cancel();

        let rejected = self.inner.router.reject_all("gateway shutting down");
        if rejected > 0 {
            tracing::warn!(rejected, "rejected outstanding calls at shutdown");
        }

        for url in &self.inner.order {
            if let Some(bridge) = &self.inner.endpoints[url].bridge {
                bridge.shutdown().await;
            }
        }
        tracing::info!("gateway shutdown complete");
    }

    fn entry(&self, url: &str) -> Result<&EndpointEntry, GatewayError> {
        self.inner
            .endpoints
            .get(url)
            .ok_or_else(|| GatewayError::UnknownEndpoint(url.to_string()))
    }
}

/// Stable per-endpoint jitter seed.
fn seed_for(url: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    hasher.finish()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event pump and inbound routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn event_pump(inner: Arc<Inner>, mut events: mpsc::Receiver<SessionEvent>) {
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            event = events.recv() => match event {
                None => break,
                Some(SessionEvent::Frame { endpoint, text }) => {
                    route_inbound(&inner, &endpoint, text).await;
                }
                Some(SessionEvent::StateChanged { endpoint, state }) => {
                    on_state_changed(&inner, &endpoint, state).await;
                }
            },
        }
    }
}

async fn on_state_changed(inner: &Arc<Inner>, endpoint: &str, state: ConnectionState) {
    tracing::info!(endpoint, state = %state, "endpoint state changed");

    match state {
        ConnectionState::Connected => {
            // A fresh connection is the moment to bring a dead tool process
            // back, if its restart budget allows.
            if let Some(entry) = inner.endpoints.get(endpoint) {
                if let Some(bridge) = &entry.bridge {
                    if !bridge.is_alive() {
                        if bridge.can_restart() {
                            if let Err(e) = bridge.respawn(0).await {
                                tracing::error!(endpoint, error = %e, "tool process respawn failed");
                            }
                        } else {
                            tracing::error!(
                                endpoint,
                                failures = bridge.consecutive_failures(),
                                "tool process restart budget exhausted, staying dead until reset"
                            );
                        }
                    }
                }
            }
        }
        ConnectionState::Reconnecting
        | ConnectionState::Disconnected
        | ConnectionState::Failed => {
            inner.router.reject_for_endpoint(endpoint);
        }
        ConnectionState::Connecting => {}
    }
}

async fn route_inbound(inner: &Arc<Inner>, endpoint: &str, text: String) {
    match inner.topology {
        Topology::Dedicated => forward_to_bridge(inner, endpoint, text).await,
        Topology::Shared => handle_shared(inner, endpoint, text).await,
    }
}

/// Dedicated topology: frames from endpoint E go to E's own process and
/// nowhere else.
async fn forward_to_bridge(inner: &Arc<Inner>, endpoint: &str, text: String) {
    let bridge = inner
        .endpoints
        .get(endpoint)
        .and_then(|entry| entry.bridge.clone());

    let failure = match bridge {
        Some(bridge) => match bridge.send_line(&text).await {
            Ok(()) => return,
            Err(e) => e.to_string(),
        },
        None => "no tool process configured".to_string(),
    };

    tracing::warn!(endpoint, error = %failure, "cannot forward frame to tool process");
    // Requests deserve an error response; notifications are dropped.
    if let Ok(Message::Request(req)) = Message::parse(&text) {
        send_response(
            inner,
            endpoint,
            JsonRpcResponse::err(req.id, CODE_SERVICE_UNAVAILABLE, failure),
        );
    }
}

/// Shared topology: the gateway's own control surface plus the executor.
async fn handle_shared(inner: &Arc<Inner>, endpoint: &str, text: String) {
    let message = match Message::parse(&text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "undecodable frame");
            return;
        }
    };

    match message {
        Message::Request(req) => handle_request(inner, endpoint, req),
        Message::Notification(note) => {
            if note.method == "notifications/initialized" {
                tracing::debug!(endpoint, "peer initialized");
            } else {
                tracing::debug!(endpoint, method = %note.method, "ignoring notification");
            }
        }
        Message::Response(resp) => {
            inner.router.resolve(resp);
        }
    }
}

fn handle_request(inner: &Arc<Inner>, endpoint: &str, req: JsonRpcRequest) {
    match req.method.as_str() {
        "initialize" => {
            let response = match serde_json::to_value(initialize_result()) {
                Ok(v) => JsonRpcResponse::ok(req.id, v),
                Err(e) => JsonRpcResponse::err(req.id, CODE_INTERNAL_ERROR, e.to_string()),
            };
            send_response(inner, endpoint, response);
        }
        "ping" => {
            send_response(inner, endpoint, JsonRpcResponse::ok(req.id, serde_json::json!({})));
        }
        "tools/list" => {
            let inner = inner.clone();
            let endpoint = endpoint.to_string();
            tokio::spawn(async move {
                let response = match inner.executor.manager().get_all_tools().await {
                    Ok(tools) => match serde_json::to_value(ToolsListResult { tools }) {
                        Ok(v) => JsonRpcResponse::ok(req.id, v),
                        Err(e) => JsonRpcResponse::err(req.id, CODE_INTERNAL_ERROR, e.to_string()),
                    },
                    Err(e) => JsonRpcResponse::err(req.id, e.code(), e.to_string()),
                };
                send_response(&inner, &endpoint, response);
            });
        }
        // Dispatched without blocking subsequent message handling.
        "tools/call" => {
            let inner = inner.clone();
            let endpoint = endpoint.to_string();
            tokio::spawn(async move {
                let response = execute_tool_call(&inner, req).await;
                send_response(&inner, &endpoint, response);
            });
        }
        other => {
            tracing::debug!(endpoint, method = %other, "method not found");
            send_response(
                inner,
                endpoint,
                JsonRpcResponse::err(
                    req.id,
                    CODE_METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                ),
            );
        }
    }
}

async fn execute_tool_call(inner: &Arc<Inner>, req: JsonRpcRequest) -> JsonRpcResponse {
    let params = req.params.unwrap_or_else(|| serde_json::json!({}));
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    match inner.executor.execute(&name, arguments).await {
        Ok(result) => match serde_json::to_value(result) {
            Ok(v) => JsonRpcResponse::ok(req.id, v),
            Err(e) => JsonRpcResponse::err(req.id, CODE_INTERNAL_ERROR, e.to_string()),
        },
        Err(e) => JsonRpcResponse::err(req.id, e.code(), e.to_string()),
    }
}

fn send_response(inner: &Arc<Inner>, endpoint: &str, response: JsonRpcResponse) {
    let id = response.id.clone();
    let frame = match serde_json::to_string(&response) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(endpoint, id = %id, error = %e, "failed to serialize response");
            return;
        }
    };
    let sent = inner
        .endpoints
        .get(endpoint)
        .map(|entry| entry.session.send(frame));
    match sent {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            tracing::warn!(endpoint, id = %id, error = %e, "dropping response, endpoint not connected");
        }
        None => {
            tracing::warn!(endpoint, id = %id, "dropping response for unknown endpoint");
        }
    }
}
