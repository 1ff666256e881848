//! Types and utilities shared by the tandem server and client.
//!
//! - `protocol`: the JSON wire envelope exchanged over the WebSocket
//! - `operation`: document operations and their version bookkeeping
//! - `time`: clock abstraction used for every expiry and window check
//! - `logger`: tracing subscriber setup for the binaries

pub mod logger;
pub mod operation;
pub mod protocol;
pub mod time;
