//! `tg-executor`: tool invocation with timeout, retry, and metrics.
//!
//! The executor sits between the message router and a [`ServiceManager`]:
//! it validates the call, enforces a per-attempt timeout, retries transient
//! failures, and keeps a bounded history of outcomes.

pub mod error;
pub mod executor;
pub mod history;
pub mod registry;

pub use error::ToolCallError;
pub use executor::ToolCallExecutor;
pub use history::{CallHistory, CallRecord, PerformanceMetrics};
pub use registry::{ServiceManager, ServiceRegistry, ServiceTool};
