//! Gateway configuration, deserialized from a TOML file.
//!
//! Each section gets its own module with serde defaults matching the
//! documented fallbacks, so a missing section (or a missing collaborator
//! that would normally supply it) still yields a usable config.

mod backoff;
mod connection;
mod endpoints;
mod routing;
mod tool_call;

pub use backoff::*;
pub use connection::*;
pub use endpoints::*;
pub use routing::*;
pub use tool_call::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote coordinator endpoints the gateway maintains sessions with.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub tool_call: ToolCallConfig,
    #[serde(default)]
    pub process: ProcessSettings,
}

impl Config {
    /// Load and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.endpoints.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "endpoints".into(),
                message: "no endpoints configured, the gateway will idle".into(),
            });
        }

        for (i, ep) in self.endpoints.iter().enumerate() {
            if !ep.url.starts_with("ws://") && !ep.url.starts_with("wss://") {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("endpoints[{i}].url"),
                    message: format!("expected ws:// or wss:// URL, got {:?}", ep.url),
                });
            }
            if self.routing.topology == Topology::Dedicated && ep.process.is_none() {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("endpoints[{i}].process"),
                    message: "dedicated topology requires a process per endpoint".into(),
                });
            }
        }

        if self.backoff.multiplier < 1.0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "backoff.multiplier".into(),
                message: "multiplier below 1.0 makes delays shrink per attempt".into(),
            });
        }
        if self.backoff.max_attempts == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "backoff.max_attempts".into(),
                message: "max_attempts must be at least 1".into(),
            });
        }
        if self.connection.heartbeat_timeout_ms >= self.connection.heartbeat_interval_ms {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "connection.heartbeat_timeout_ms".into(),
                message: "heartbeat timeout should be shorter than the interval".into(),
            });
        }
        if self.tool_call.timeout_ms == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tool_call.timeout_ms".into(),
                message: "tool call timeout must be non-zero".into(),
            });
        }
        if self.tool_call.max_attempts == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tool_call.max_attempts".into(),
                message: "max_attempts must be at least 1".into(),
            });
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}
