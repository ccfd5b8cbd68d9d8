//! # TimeBank server
//!
//! Wires configuration, the `PostgreSQL` store, the mailer and the HTTP/WebSocket
//! router into a running process.

pub mod app;
pub mod config;

pub use config::Config;
