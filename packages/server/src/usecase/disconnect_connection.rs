//! UseCase: connection teardown
//!
//! Runs once per connection, whatever ended it (client close, transport error,
//! liveness/inactivity termination, auth timeout, shutdown). Teardown is
//! idempotent: the second call finds nothing to remove.

use std::sync::Arc;

use tandem_shared::protocol::{CloseCode, ServerMessage};

use crate::domain::{Connection, ConnectionId, ConnectionRepository, MessagePusher};

use super::{auth_timeout::AuthTimeouts, broadcast_to_room::BroadcastToRoomUseCase};

pub struct DisconnectConnectionUseCase {
    repository: Arc<dyn ConnectionRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    auth_timeouts: Arc<AuthTimeouts>,
    broadcast: Arc<BroadcastToRoomUseCase>,
}

impl DisconnectConnectionUseCase {
    pub fn new(
        repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        auth_timeouts: Arc<AuthTimeouts>,
        broadcast: Arc<BroadcastToRoomUseCase>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
            auth_timeouts,
            broadcast,
        }
    }

    /// Remove the connection from the registry (and with it the rooms, the IP
    /// slot, and the rate-limit bucket), then tell each former room it left.
    ///
    /// Returns the removed connection, or `None` when it was already gone.
    pub async fn execute(&self, connection_id: &ConnectionId) -> Option<Connection> {
        self.auth_timeouts.cancel(connection_id).await;
        let connection = self.repository.remove(connection_id).await?;
        self.message_pusher.unregister_client(connection_id).await;

        let from = connection.peer_ref();
        let mut rooms: Vec<_> = connection.rooms.iter().cloned().collect();
        rooms.sort();
        for room_id in rooms {
            let message = ServerMessage::UserLeft {
                room_id: room_id.to_string(),
                from: from.clone(),
            };
            self.broadcast.send(&room_id, &message, None).await;
        }

        tracing::info!(
            "Connection '{}' disconnected ({} connection(s) remain)",
            connection_id,
            self.repository.count().await
        );
        Some(connection)
    }

    /// Ask the writer to close with `code`, then tear down immediately without
    /// waiting for the peer
    pub async fn terminate(
        &self,
        connection_id: &ConnectionId,
        code: CloseCode,
        reason: &str,
    ) -> Option<Connection> {
        if let Err(e) = self.message_pusher.close(connection_id, code, reason).await {
            tracing::debug!("Close frame for '{}' not sent: {}", connection_id, e);
        }
        self.execute(connection_id).await
    }

    /// Close every open connection with `code`; returns how many were closed
    pub async fn terminate_all(&self, code: CloseCode, reason: &str) -> usize {
        let mut closed = 0;
        for id in self.repository.all_ids().await {
            if self.terminate(&id, code, reason).await.is_some() {
                closed += 1;
            }
        }
        closed
    }
}
