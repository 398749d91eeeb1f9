//! `tg-bridge`: local tool-process bridge.
//!
//! When an endpoint is backed by a local tool process, this crate owns the
//! child: spawning, newline framing of its stdout, stderr passthrough, the
//! bounded restart policy, and graceful terminate-then-kill shutdown.

pub mod framing;
pub mod process;

pub use framing::LineFramer;
pub use process::{BridgeError, ProcessBridge, RestartRecord, RestartStrategy};
