//! `tg-domain`: shared configuration and error types for toolgate.
//!
//! Everything here is plain data: the config structs deserialized from the
//! gateway's TOML file and the shared error type. Behavior lives in the
//! sibling crates (`tg-session`, `tg-bridge`, `tg-executor`, `tg-gateway`).

pub mod config;
pub mod error;

pub use error::{Error, Result};
