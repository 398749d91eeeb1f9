//! Reconnection backoff configuration.
//!
//! The actual delay computation lives in `tg-session`; this is the config
//! surface that selects a strategy and its parameters.

use serde::{Deserialize, Serialize};

/// Which delay curve to use between reconnect attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Retry with no delay.
    Immediate,
    /// Always wait `initial_delay_ms`.
    Fixed,
    /// `initial_delay_ms + attempt * multiplier * 1000`.
    Linear,
    /// `initial_delay_ms * multiplier^(attempt-1)`.
    #[default]
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Base delay; also the documented `reconnectInterval` fallback (5s).
    #[serde(default = "d_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Cap applied to the computed delay.
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor for linear/exponential strategies.
    #[serde(default = "d_multiplier")]
    pub multiplier: f64,

    /// Signed jitter amplitude in ms. `0` disables jitter.
    #[serde(default = "d_jitter_ms")]
    pub jitter_ms: u64,

    /// Consecutive failed attempts before the session gives up (FAILED).
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            initial_delay_ms: d_initial_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            multiplier: d_multiplier(),
            jitter_ms: d_jitter_ms(),
            max_attempts: d_max_attempts(),
        }
    }
}

fn d_initial_delay_ms() -> u64 {
    5_000
}

fn d_max_delay_ms() -> u64 {
    60_000
}

fn d_multiplier() -> f64 {
    2.0
}

fn d_jitter_ms() -> u64 {
    1_000
}

fn d_max_attempts() -> u32 {
    10
}
