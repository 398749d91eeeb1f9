//! Local tool-process bridge.
//!
//! Spawns one child process per managed endpoint slot, frames its stdout
//! into discrete messages, and passes stderr through to the log. An
//! unexpected exit marks the bridge dead without respawning; the next
//! reconnection cycle calls [`ProcessBridge::respawn`], bounded by the
//! consecutive-failure counter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;

use tg_domain::config::{ProcessConfig, ProcessSettings};

use crate::framing::LineFramer;

/// Errors that can occur while managing a tool process.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn tool process: {0}")]
    Spawn(String),

    #[error("tool process has exited")]
    ProcessExited,

    #[error("tool process already running")]
    AlreadyRunning,

    #[error("restart bound exhausted after {0} consecutive failures")]
    RestartsExhausted(u32),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Restart history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One process lifetime, kept in a bounded history for observability and
/// for the restart-bound decision.
#[derive(Debug, Clone)]
pub struct RestartRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
    /// Reconnect-cycle delay that preceded this spawn, if any.
    pub delay_ms: u64,
    /// Which spawn path produced this lifetime: the initial spawn or a
    /// restart driven by a reconnect cycle.
    pub strategy: RestartStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartStrategy {
    Initial,
    Reconnect,
}

impl std::fmt::Display for RestartStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RestartStrategy::Initial => "initial",
            RestartStrategy::Reconnect => "reconnect",
        })
    }
}

const RESTART_HISTORY_CAP: usize = 20;

#[derive(Debug)]
struct RestartTracker {
    max_restarts: u32,
    consecutive_failures: u32,
    spawn_count: u32,
    history: VecDeque<RestartRecord>,
}

impl RestartTracker {
    fn new(max_restarts: u32) -> Self {
        Self {
            max_restarts,
            consecutive_failures: 0,
            spawn_count: 0,
            history: VecDeque::new(),
        }
    }

    fn can_restart(&self) -> bool {
        self.consecutive_failures < self.max_restarts
    }

    fn begin(&mut self, delay_ms: u64, strategy: RestartStrategy) {
        self.spawn_count += 1;
        if self.history.len() == RESTART_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(RestartRecord {
            attempt: self.spawn_count,
            started_at: Utc::now(),
            ended_at: None,
            success: false,
            error: None,
            delay_ms,
            strategy,
        });
    }

    fn finish(&mut self, graceful: bool, error: Option<String>) {
        if let Some(rec) = self.history.back_mut().filter(|r| r.ended_at.is_none()) {
            rec.ended_at = Some(Utc::now());
            rec.success = graceful;
            rec.error = error;
        }
        if graceful {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProcessBridge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State shared with the reader/stderr tasks.
struct Shared {
    name: String,
    alive: AtomicBool,
    /// Set before a self-issued terminate so the reader can tell a graceful
    /// exit from a crash.
    terminating: AtomicBool,
    restarts: parking_lot::Mutex<RestartTracker>,
    output_tx: mpsc::Sender<String>,
}

/// Bridges a child process's stdio to framed protocol messages.
pub struct ProcessBridge {
    config: ProcessConfig,
    settings: ProcessSettings,
    shared: Arc<Shared>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl ProcessBridge {
    /// Create a bridge. Complete messages from the process's stdout are
    /// delivered on `output_tx`; nothing runs until [`spawn`](Self::spawn).
    pub fn new(
        name: impl Into<String>,
        config: ProcessConfig,
        settings: ProcessSettings,
        output_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                alive: AtomicBool::new(false),
                terminating: AtomicBool::new(false),
                restarts: parking_lot::Mutex::new(RestartTracker::new(settings.max_restarts)),
                output_tx,
            }),
            config,
            settings,
            stdin: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the process for the first time.
    pub async fn spawn(&self) -> Result<(), BridgeError> {
        self.spawn_inner(0, RestartStrategy::Initial).await
    }

    /// Respawn after an unexpected exit, recording the reconnect-cycle delay
    /// that preceded it. Bounded by the consecutive-failure counter.
    pub async fn respawn(&self, delay_ms: u64) -> Result<(), BridgeError> {
        self.spawn_inner(delay_ms, RestartStrategy::Reconnect).await
    }

    async fn spawn_inner(
        &self,
        delay_ms: u64,
        strategy: RestartStrategy,
    ) -> Result<(), BridgeError> {
        if self.shared.alive.load(Ordering::SeqCst) {
            return Err(BridgeError::AlreadyRunning);
        }
        {
            let restarts = self.shared.restarts.lock();
            if !restarts.can_restart() {
                return Err(BridgeError::RestartsExhausted(restarts.consecutive_failures));
            }
        }

        let mut cmd = tokio::process::Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        self.shared.restarts.lock().begin(delay_ms, strategy);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                let msg = format!("{}: {e}", self.config.command);
                self.shared.restarts.lock().finish(false, Some(msg.clone()));
                return Err(BridgeError::Spawn(msg));
            }
        };

        let stdin = child.stdin.take().ok_or_else(|| {
            BridgeError::Spawn("failed to capture child stdin".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            BridgeError::Spawn("failed to capture child stdout".into())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            BridgeError::Spawn("failed to capture child stderr".into())
        })?;

        self.shared.terminating.store(false, Ordering::SeqCst);
        self.shared.alive.store(true, Ordering::SeqCst);
        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);

        tracing::info!(
            bridge = %self.shared.name,
            command = %self.config.command,
            "tool process spawned"
        );

        // Stderr passthrough, one log line per process line.
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(bridge = %shared.name, "{line}");
            }
        });

        // Stdout reader: frame bytes into messages, detect exit via EOF.
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut framer = LineFramer::new();
            let mut buf = [0u8; 4096];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        for line in framer.push(&buf[..n]) {
                            if shared.output_tx.send(line).await.is_err() {
                                // Receiver gone, gateway is shutting down.
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(bridge = %shared.name, error = %e, "stdout read failed");
                        break;
                    }
                }
            }
            if framer.pending() > 0 {
                tracing::warn!(
                    bridge = %shared.name,
                    bytes = framer.pending(),
                    "discarding incomplete trailing message from tool process"
                );
            }

            let graceful = shared.terminating.load(Ordering::SeqCst);
            shared.alive.store(false, Ordering::SeqCst);
            let error = (!graceful).then(|| "unexpected exit".to_string());
            shared.restarts.lock().finish(graceful, error);
            if graceful {
                tracing::debug!(bridge = %shared.name, "tool process exited after terminate");
            } else {
                tracing::warn!(bridge = %shared.name, "tool process exited unexpectedly");
            }
        });

        Ok(())
    }

    /// Write one framed message to the process's stdin.
    pub async fn send_line(&self, line: &str) -> Result<(), BridgeError> {
        if !self.is_alive() {
            return Err(BridgeError::ProcessExited);
        }
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(BridgeError::ProcessExited)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Graceful shutdown: close stdin, wait out the grace period, then kill.
    pub async fn shutdown(&self) {
        self.shared.terminating.store(true, Ordering::SeqCst);

        if let Some(mut stdin) = self.stdin.lock().await.take() {
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(bridge = %self.shared.name, error = %e, "error closing stdin");
            }
        }

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            match tokio::time::timeout(self.settings.shutdown_grace(), child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(bridge = %self.shared.name, ?status, "tool process exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(bridge = %self.shared.name, error = %e, "error waiting for tool process");
                }
                Err(_) => {
                    tracing::warn!(
                        bridge = %self.shared.name,
                        "tool process did not exit within grace period, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(bridge = %self.shared.name, error = %e, "failed to kill tool process");
                    }
                }
            }
        }
        self.shared.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Whether the restart bound still permits a respawn.
    pub fn can_restart(&self) -> bool {
        self.shared.restarts.lock().can_restart()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared.restarts.lock().consecutive_failures
    }

    /// Re-arm the restart budget (manual reset or successful reconnect cycle).
    pub fn reset_restarts(&self) {
        self.shared.restarts.lock().consecutive_failures = 0;
    }

    /// Snapshot of the bounded restart history.
    pub fn restart_history(&self) -> Vec<RestartRecord> {
        self.shared.restarts.lock().history.iter().cloned().collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
