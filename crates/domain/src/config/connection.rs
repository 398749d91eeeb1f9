//! Connection-level timing knobs shared by every endpoint session.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// How often a liveness probe is sent while connected.
    #[serde(default = "d_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// How long to wait for the probe reply before force-terminating.
    #[serde(default = "d_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// How long a single connect attempt may take before it counts as failed.
    #[serde(default = "d_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long a locally-originated request may stay in flight before it is
    /// abandoned with a timeout error.
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: d_heartbeat_interval_ms(),
            heartbeat_timeout_ms: d_heartbeat_timeout_ms(),
            connect_timeout_ms: d_connect_timeout_ms(),
            request_timeout_ms: d_request_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn d_heartbeat_interval_ms() -> u64 {
    30_000
}

fn d_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn d_connect_timeout_ms() -> u64 {
    10_000
}

fn d_request_timeout_ms() -> u64 {
    30_000
}
