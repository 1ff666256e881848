//! Real-time collaboration server.
//!
//! A WebSocket gateway that authenticates connections, rate-limits them, and
//! multiplexes them into rooms, backed by an identity & session service and a
//! per-document conflict resolver.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
