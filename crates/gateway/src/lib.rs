//! `tg-gateway`: the resilient MCP gateway binary and facade.
//!
//! Wires together endpoint sessions ([`tg_session`]), local tool processes
//! ([`tg_bridge`]), and tool execution ([`tg_executor`]) behind one
//! [`Gateway`] with a small CLI around it.

pub mod cli;
pub mod gateway;
pub mod router;

pub use gateway::{EndpointStatus, Gateway, GatewayError, GatewayStatus};
pub use router::MessageRouter;
