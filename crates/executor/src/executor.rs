//! Tool-call execution: validation, per-attempt timeout, bounded retry.
//!
//! Each `execute` races the service call against the configured timeout.
//! When the timeout wins, the in-flight call is dropped on the spot, so a
//! late success can never reach the caller or be counted twice. Transient
//! failures (unavailable, timeout) retry with exponential delay up to the
//! configured attempt budget; the caller always sees the last failure, and
//! exactly one [`CallRecord`] lands in history per invocation.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tg_domain::config::ToolCallConfig;
use tg_protocol::ToolCallResult;

use crate::error::ToolCallError;
use crate::history::{CallHistory, CallRecord, PerformanceMetrics};
use crate::registry::ServiceManager;

pub struct ToolCallExecutor {
    manager: Arc<dyn ServiceManager>,
    config: ToolCallConfig,
    history: CallHistory,
}

impl ToolCallExecutor {
    pub fn new(manager: Arc<dyn ServiceManager>, config: ToolCallConfig) -> Self {
        let history = CallHistory::new(config.history_capacity);
        Self {
            manager,
            config,
            history,
        }
    }

    pub fn manager(&self) -> &Arc<dyn ServiceManager> {
        &self.manager
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.history.metrics()
    }

    pub fn history(&self) -> Vec<CallRecord> {
        self.history.records()
    }

    /// Run one tool invocation to a terminal outcome.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, ToolCallError> {
        let started_at = Utc::now();
        let start = Instant::now();

        if tool_name.trim().is_empty() {
            let err = ToolCallError::InvalidParams("tool name must be a non-empty string".into());
            self.finish(tool_name, started_at, start, 1, Err(&err));
            return Err(err);
        }
        if !arguments.is_object() {
            let err = ToolCallError::InvalidParams("arguments must be an object".into());
            self.finish(tool_name, started_at, start, 1, Err(&err));
            return Err(err);
        }

        let timeout = self.config.timeout();
        let mut attempt: u32 = 1;
        loop {
            let outcome =
                tokio::time::timeout(timeout, self.manager.call_tool(tool_name, arguments.clone()))
                    .await;

            let error = match outcome {
                Ok(Ok(result)) => {
                    self.finish(tool_name, started_at, start, attempt, Ok(()));
                    return Ok(result);
                }
                Ok(Err(e)) => e,
                // Dropping the timed-out future discards any late result.
                Err(_) => ToolCallError::Timeout(self.config.timeout_ms),
            };

            if error.is_retryable() && attempt < self.config.max_attempts {
                let delay = self.config.retry_delay(attempt);
                tracing::warn!(
                    tool = tool_name,
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "tool call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            self.finish(tool_name, started_at, start, attempt, Err(&error));
            return Err(error);
        }
    }

    fn finish(
        &self,
        tool: &str,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
        attempts: u32,
        outcome: Result<(), &ToolCallError>,
    ) {
        let duration = start.elapsed();
        match outcome {
            Ok(()) => {
                tracing::info!(
                    tool,
                    attempts,
                    duration_ms = duration.as_millis() as u64,
                    "tool call succeeded"
                );
            }
            Err(e) => {
                tracing::error!(
                    tool,
                    attempts,
                    duration_ms = duration.as_millis() as u64,
                    kind = e.kind(),
                    error = %e,
                    "tool call failed"
                );
            }
        }
        self.history.record(CallRecord {
            tool: tool.into(),
            started_at,
            duration,
            attempts,
            success: outcome.is_ok(),
            error_kind: outcome.err().map(|e| e.kind()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tg_protocol::{McpToolDef, ToolCallContent};

    fn ok_result() -> ToolCallResult {
        ToolCallResult {
            content: vec![ToolCallContent::text("done")],
            is_error: false,
        }
    }

    fn fast_config() -> ToolCallConfig {
        ToolCallConfig {
            timeout_ms: 1_000,
            max_attempts: 3,
            retry_initial_delay_ms: 10,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 100,
            history_capacity: 16,
        }
    }

    /// Fails with `error` until `failures` calls have happened, then succeeds.
    struct FlakyManager {
        calls: AtomicU32,
        failures: u32,
        error: ToolCallError,
    }

    impl FlakyManager {
        fn new(failures: u32, error: ToolCallError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                error,
            }
        }
    }

    #[async_trait::async_trait]
    impl ServiceManager for FlakyManager {
        async fn get_all_tools(&self) -> Result<Vec<McpToolDef>, ToolCallError> {
            Ok(vec![])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolCallResult, ToolCallError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(ok_result())
            }
        }
    }

    /// Never completes within the timeout; counts calls.
    struct SlowManager {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ServiceManager for SlowManager {
        async fn get_all_tools(&self) -> Result<Vec<McpToolDef>, ToolCallError> {
            Ok(vec![])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolCallResult, ToolCallError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ok_result())
        }
    }

    #[tokio::test]
    async fn success_records_once() {
        let mgr = Arc::new(FlakyManager::new(0, ToolCallError::ExecutionError("".into())));
        let exec = ToolCallExecutor::new(mgr, fast_config());

        let result = exec.execute("echo", serde_json::json!({})).await.unwrap();
        assert!(!result.is_error);

        let m = exec.metrics();
        assert_eq!(m.total_calls, 1);
        assert_eq!(m.succeeded, 1);
        assert_eq!(exec.history().len(), 1);
        assert_eq!(exec.history()[0].attempts, 1);
    }

    #[tokio::test]
    async fn empty_tool_name_is_invalid_params() {
        let mgr = Arc::new(FlakyManager::new(0, ToolCallError::ExecutionError("".into())));
        let exec = ToolCallExecutor::new(mgr.clone(), fast_config());

        let err = exec.execute("  ", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolCallError::InvalidParams(_)));
        // Never reached the service.
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(exec.metrics().failed, 1);
    }

    #[tokio::test]
    async fn non_object_arguments_rejected() {
        let mgr = Arc::new(FlakyManager::new(0, ToolCallError::ExecutionError("".into())));
        let exec = ToolCallExecutor::new(mgr, fast_config());

        let err = exec
            .execute("echo", serde_json::json!([1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolCallError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let mgr = Arc::new(FlakyManager::new(
            2,
            ToolCallError::ServiceUnavailable("busy".into()),
        ));
        let exec = ToolCallExecutor::new(mgr.clone(), fast_config());

        let result = exec.execute("echo", serde_json::json!({})).await;
        assert!(result.is_ok());
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 3);

        // One record for the whole invocation, not one per attempt.
        let records = exec.history();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attempts, 3);
        assert!(records[0].success);
        assert_eq!(exec.metrics().total_calls, 1);
    }

    #[tokio::test]
    async fn non_retryable_failure_does_not_retry() {
        let mgr = Arc::new(FlakyManager::new(
            5,
            ToolCallError::ExecutionError("boom".into()),
        ));
        let exec = ToolCallExecutor::new(mgr.clone(), fast_config());

        let err = exec.execute("echo", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolCallError::ExecutionError(_)));
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exec.history()[0].attempts, 1);
    }

    #[tokio::test]
    async fn tool_not_found_does_not_retry() {
        let mgr = Arc::new(FlakyManager::new(
            5,
            ToolCallError::ToolNotFound("nope".into()),
        ));
        let exec = ToolCallExecutor::new(mgr.clone(), fast_config());

        let err = exec.execute("nope", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolCallError::ToolNotFound(_)));
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_discards_late_result_and_records_once() {
        let mgr = Arc::new(SlowManager {
            calls: AtomicU32::new(0),
        });
        let mut config = fast_config();
        config.max_attempts = 2;
        let exec = ToolCallExecutor::new(mgr, config);

        let err = exec.execute("slow", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolCallError::Timeout(1_000)));

        // Both attempts timed out; exactly one terminal record exists and
        // the late successes were dropped with their futures.
        let m = exec.metrics();
        assert_eq!(m.total_calls, 1);
        assert_eq!(m.failed, 1);
        assert_eq!(exec.history()[0].attempts, 2);
        assert_eq!(exec.history()[0].error_kind, Some("timeout"));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let mgr = Arc::new(FlakyManager::new(
            10,
            ToolCallError::ServiceUnavailable("still down".into()),
        ));
        let exec = ToolCallExecutor::new(mgr.clone(), fast_config());

        let err = exec.execute("echo", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolCallError::ServiceUnavailable(_)));
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 3);
        assert_eq!(exec.history()[0].error_kind, Some("service_unavailable"));
    }
}
