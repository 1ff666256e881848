//! Outbound message delivery.
//!
//! The UI layer owns the WebSocket and hands the pusher one end of a channel
//! per connection; use cases only ever see [`MessagePusher`].

use async_trait::async_trait;
use tandem_shared::protocol::CloseCode;
use tokio::sync::mpsc;

use super::{error::MessagePushError, value_object::ConnectionId};

/// What the per-connection writer task should put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Liveness ping
    Ping,
    Close { code: u16, reason: String },
}

impl OutboundFrame {
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        OutboundFrame::Close {
            code: code.code(),
            reason: reason.into(),
        }
    }
}

pub type PusherChannel = mpsc::UnboundedSender<OutboundFrame>;

#[async_trait]
pub trait MessagePusher: Send + Sync {
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel);

    async fn unregister_client(&self, connection_id: &ConnectionId);

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError>;

    /// Best-effort fan-out; returns how many targets the frame was handed to
    async fn broadcast(&self, targets: Vec<ConnectionId>, content: &str) -> usize;

    async fn ping(&self, connection_id: &ConnectionId) -> Result<(), MessagePushError>;

    /// Ask the writer to send a close frame and stop
    async fn close(
        &self,
        connection_id: &ConnectionId,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), MessagePushError>;
}
