//! Tool-call error taxonomy and classification.

use tg_protocol::{
    CODE_EXECUTION_ERROR, CODE_INVALID_PARAMS, CODE_SERVICE_UNAVAILABLE, CODE_TOOL_NOT_FOUND,
    CODE_TOOL_TIMEOUT,
};

/// Every way a tool invocation can fail. Service errors arrive as free-form
/// messages and are classified by [`ToolCallError::classify`];
/// `ExecutionError` is the catch-all.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("tool call timed out after {0}ms")]
    Timeout(u64),
    #[error("execution error: {0}")]
    ExecutionError(String),
}

impl ToolCallError {
    /// Map a service error message into the taxonomy by pattern matching.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("not found") || lower.contains("unknown tool") {
            ToolCallError::ToolNotFound(message)
        } else if lower.contains("unavailable")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("not connected")
        {
            ToolCallError::ServiceUnavailable(message)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            // Duration unknown when the service itself reports the timeout.
            ToolCallError::Timeout(0)
        } else {
            ToolCallError::ExecutionError(message)
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolCallError::ServiceUnavailable(_) | ToolCallError::Timeout(_)
        )
    }

    /// Stable label used in call records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolCallError::InvalidParams(_) => "invalid_params",
            ToolCallError::ToolNotFound(_) => "tool_not_found",
            ToolCallError::ServiceUnavailable(_) => "service_unavailable",
            ToolCallError::Timeout(_) => "timeout",
            ToolCallError::ExecutionError(_) => "execution_error",
        }
    }

    /// JSON-RPC error code for the wire response.
    pub fn code(&self) -> i64 {
        match self {
            ToolCallError::InvalidParams(_) => CODE_INVALID_PARAMS,
            ToolCallError::ToolNotFound(_) => CODE_TOOL_NOT_FOUND,
            ToolCallError::ServiceUnavailable(_) => CODE_SERVICE_UNAVAILABLE,
            ToolCallError::Timeout(_) => CODE_TOOL_TIMEOUT,
            ToolCallError::ExecutionError(_) => CODE_EXECUTION_ERROR,
        }
    }
}
