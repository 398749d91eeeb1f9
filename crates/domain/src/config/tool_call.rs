//! Tool-call execution knobs: timeout, bounded retry, history depth.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallConfig {
    /// Per-attempt timeout for the underlying service call.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts (first try + retries).
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,

    /// Base delay before the first retry.
    #[serde(default = "d_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Exponential growth factor between retries.
    #[serde(default = "d_retry_multiplier")]
    pub retry_multiplier: f64,

    /// Cap on the retry delay.
    #[serde(default = "d_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Ring-buffer capacity for completed-call records.
    #[serde(default = "d_history_capacity")]
    pub history_capacity: usize,
}

impl Default for ToolCallConfig {
    fn default() -> Self {
        Self {
            timeout_ms: d_timeout_ms(),
            max_attempts: d_max_attempts(),
            retry_initial_delay_ms: d_retry_initial_delay_ms(),
            retry_multiplier: d_retry_multiplier(),
            retry_max_delay_ms: d_retry_max_delay_ms(),
            history_capacity: d_history_capacity(),
        }
    }
}

impl ToolCallConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (1-indexed), clamped to the cap.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_initial_delay_ms as f64
            * self.retry_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((base as u64).min(self.retry_max_delay_ms))
    }
}

fn d_timeout_ms() -> u64 {
    30_000
}

fn d_max_attempts() -> u32 {
    3
}

fn d_retry_initial_delay_ms() -> u64 {
    1_000
}

fn d_retry_multiplier() -> f64 {
    2.0
}

fn d_retry_max_delay_ms() -> u64 {
    30_000
}

fn d_history_capacity() -> usize {
    100
}
