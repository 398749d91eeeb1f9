//! `tg-session`: resilient endpoint connections.
//!
//! One [`EndpointSession`] per coordinator URL: it owns the WebSocket,
//! drives the connect/reconnect state machine, probes liveness with
//! JSON-RPC pings, and surfaces inbound frames plus state transitions as
//! [`SessionEvent`]s.

pub mod backoff;
pub mod session;

pub use backoff::{BackoffPolicy, DEFAULT_RECONNECT_FLOOR};
pub use session::{
    ConnectionState, EndpointSession, SessionConfig, SessionError, SessionEvent,
};
