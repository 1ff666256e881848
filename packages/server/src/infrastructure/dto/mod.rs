//! Data Transfer Objects.
//!
//! WebSocket frames are defined once in `tandem_shared::protocol`; this
//! module holds the HTTP API bodies and their conversions from entities.

pub mod conversion;
pub mod http;
