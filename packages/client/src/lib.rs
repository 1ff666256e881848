//! Collaboration client for tandem.
//!
//! [`CollabClient`] keeps one room connection alive across transport drops:
//! it authenticates on every open, queues outgoing messages while offline,
//! reconnects with exponential backoff, and reconciles remote presence into
//! edge-triggered join/leave callbacks.

pub mod auth_api;
pub mod config;
pub mod domain;
pub mod edit_buffer;
pub mod error;
pub mod formatter;
pub mod handler;
pub mod outbox;
pub mod presence;
pub mod ui;

mod orchestrator;
mod runner;
mod session;

pub use config::{ClientConfig, ReconnectPolicy};
pub use error::ClientError;
pub use handler::{CollabEventHandler, NoopHandler};
pub use orchestrator::{CollabClient, ConnectionStatus};
