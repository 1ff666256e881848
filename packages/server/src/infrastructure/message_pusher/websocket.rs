//! WebSocket-backed `MessagePusher`.
//!
//! ## Responsibilities
//!
//! - Hold the per-connection `UnboundedSender<OutboundFrame>`
//! - Hand frames to those senders (push_to, broadcast, ping, close)
//!
//! The UI layer creates the WebSocket and the channel; the writer task on the
//! other end of the channel turns frames into WebSocket messages.

use std::collections::HashMap;

use async_trait::async_trait;
use tandem_shared::protocol::CloseCode;
use tokio::sync::Mutex;

use crate::domain::{
    ConnectionId, MessagePushError, MessagePusher, OutboundFrame, PusherChannel,
};

#[derive(Default)]
pub struct WebSocketMessagePusher {
    /// Key: connection id
    clients: Mutex<HashMap<ConnectionId, PusherChannel>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn send_frame(
        &self,
        connection_id: &ConnectionId,
        frame: OutboundFrame,
    ) -> Result<(), MessagePushError> {
        let clients = self.clients.lock().await;
        let sender = clients
            .get(connection_id)
            .ok_or_else(|| MessagePushError::ConnectionNotFound(connection_id.to_string()))?;
        sender
            .send(frame)
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel) {
        let mut clients = self.clients.lock().await;
        tracing::debug!("Connection '{}' registered to MessagePusher", connection_id);
        clients.insert(connection_id, sender);
    }

    async fn unregister_client(&self, connection_id: &ConnectionId) {
        let mut clients = self.clients.lock().await;
        clients.remove(connection_id);
        tracing::debug!(
            "Connection '{}' unregistered from MessagePusher",
            connection_id
        );
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError> {
        self.send_frame(connection_id, OutboundFrame::Text(content.to_string()))
            .await?;
        tracing::debug!("Pushed message to connection '{}'", connection_id);
        Ok(())
    }

    async fn broadcast(&self, targets: Vec<ConnectionId>, content: &str) -> usize {
        let clients = self.clients.lock().await;
        let mut delivered = 0;

        for target in targets {
            match clients.get(&target) {
                // A failed send means the writer already stopped; skip it
                Some(sender) => match sender.send(OutboundFrame::Text(content.to_string())) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!("Failed to push message to connection '{}': {}", target, e)
                    }
                },
                None => tracing::debug!(
                    "Connection '{}' not found during broadcast, skipping",
                    target
                ),
            }
        }

        delivered
    }

    async fn ping(&self, connection_id: &ConnectionId) -> Result<(), MessagePushError> {
        self.send_frame(connection_id, OutboundFrame::Ping).await
    }

    async fn close(
        &self,
        connection_id: &ConnectionId,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), MessagePushError> {
        tracing::debug!(
            "Closing connection '{}' with {} ({})",
            connection_id,
            code.code(),
            reason
        );
        self.send_frame(connection_id, OutboundFrame::close(code, reason))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    // ========================================
    // 【何をテストするか】
    // - push_to: 特定の接続への送信と、未登録接続のエラー
    // - broadcast: 複数接続への送信と配信数
    // - close / ping: 制御フレームの受け渡し
    // ========================================

    #[tokio::test]
    async fn test_push_to_success() {
        // テスト項目: 特定の接続にメッセージを送信できる
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = ConnectionId::from("alice");
        pusher.register_client(id.clone(), tx).await;

        // when (操作):
        let result = pusher.push_to(&id, "Hello").await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("Hello".into())));
    }

    #[tokio::test]
    async fn test_push_to_connection_not_found() {
        // テスト項目: 未登録の接続への送信はエラーを返す
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();

        // when (操作):
        let result = pusher.push_to(&ConnectionId::from("ghost"), "Hello").await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(MessagePushError::ConnectionNotFound("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_broadcast_counts_deliveries() {
        // テスト項目: ブロードキャストは配信できた接続数を返し、未登録・切断済みはスキップされる
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        pusher.register_client(ConnectionId::from("alice"), tx1).await;
        pusher.register_client(ConnectionId::from("bob"), tx2).await;
        drop(rx2);

        // when (操作):
        let delivered = pusher
            .broadcast(
                vec![
                    ConnectionId::from("alice"),
                    ConnectionId::from("bob"),
                    ConnectionId::from("ghost"),
                ],
                "Broadcast message",
            )
            .await;

        // then (期待する結果):
        assert_eq!(delivered, 1);
        assert_eq!(
            rx1.recv().await,
            Some(OutboundFrame::Text("Broadcast message".into()))
        );
    }

    #[tokio::test]
    async fn test_close_and_ping_frames() {
        // テスト項目: close / ping が制御フレームとして渡される
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = ConnectionId::from("alice");
        pusher.register_client(id.clone(), tx).await;

        // when (操作):
        pusher.ping(&id).await.unwrap();
        pusher
            .close(&id, CloseCode::Inactivity, "idle")
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(rx.recv().await, Some(OutboundFrame::Ping));
        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Close {
                code: 4000,
                reason: "idle".into()
            })
        );
    }
}
