//! Endpoint and tool-process configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One remote coordinator endpoint the gateway keeps a session with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,

    /// Local tool process backing this endpoint (dedicated topology).
    #[serde(default)]
    pub process: Option<ProcessConfig>,
}

/// Command line for a local tool process bridged over stdio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// The command to spawn (e.g. `"npx"`).
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Optional environment variables to set on the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Restart and shutdown policy shared by all managed processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSettings {
    /// Consecutive unexpected exits tolerated before the bridge stays dead.
    #[serde(default = "d_max_restarts")]
    pub max_restarts: u32,

    /// Grace period between the terminate signal and a forced kill.
    #[serde(default = "d_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            max_restarts: d_max_restarts(),
            shutdown_grace_ms: d_shutdown_grace_ms(),
        }
    }
}

impl ProcessSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn d_max_restarts() -> u32 {
    3
}

fn d_shutdown_grace_ms() -> u64 {
    5_000
}
