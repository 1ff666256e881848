//! UseCase: fan a frame out to the members of one room.

use std::sync::Arc;

use tandem_shared::protocol::ServerMessage;

use crate::domain::{ConnectionId, ConnectionRepository, MessagePusher, RoomId};

pub struct BroadcastToRoomUseCase {
    repository: Arc<dyn ConnectionRepository>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl BroadcastToRoomUseCase {
    pub fn new(
        repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// Deliver `payload` to every current member of `room_id` except
    /// `exclude`. Members that join afterwards never see it.
    ///
    /// Returns the number of connections the frame was handed to.
    pub async fn execute(
        &self,
        room_id: &RoomId,
        payload: &str,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let targets: Vec<ConnectionId> = self
            .repository
            .members_of(room_id)
            .await
            .into_iter()
            .filter(|id| Some(id) != exclude)
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let delivered = self.message_pusher.broadcast(targets, payload).await;
        tracing::debug!("Broadcast to room '{}' reached {} connection(s)", room_id, delivered);
        delivered
    }

    /// Serialize and broadcast; a serialization failure drops the frame
    pub async fn send(
        &self,
        room_id: &RoomId,
        message: &ServerMessage,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        match message.to_json() {
            Ok(json) => self.execute(room_id, &json, exclude).await,
            Err(e) => {
                tracing::error!("Failed to serialize message for room '{}': {}", room_id, e);
                0
            }
        }
    }
}
