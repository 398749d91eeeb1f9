//! Topology selection for the message router.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    #[serde(default)]
    pub topology: Topology,
}

/// How endpoints and tool providers are wired together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// One shared tool provider; requests fan in, round-robin across
    /// connected endpoints for locally-originated traffic.
    #[default]
    Shared,
    /// Each endpoint owns its own tool process; no cross-endpoint sharing.
    Dedicated,
}
