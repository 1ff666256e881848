//! `MessagePusher` implementations.
//!
//! - `websocket`: per-connection channels drained by WebSocket writer tasks

pub mod websocket;

pub use websocket::WebSocketMessagePusher;
