//! UseCase: read-only views of the gateway for the HTTP API.

use std::sync::Arc;

use crate::domain::{Connection, ConnectionRepository, RoomId};

use super::document_versions::DocumentVersions;

#[derive(Debug, Clone)]
pub struct RoomDetail {
    pub room_id: RoomId,
    /// Sorted by connection id
    pub members: Vec<Connection>,
    pub document_version: Option<u64>,
}

pub struct QueryRoomsUseCase {
    repository: Arc<dyn ConnectionRepository>,
    documents: Arc<DocumentVersions>,
}

impl QueryRoomsUseCase {
    pub fn new(repository: Arc<dyn ConnectionRepository>, documents: Arc<DocumentVersions>) -> Self {
        Self {
            repository,
            documents,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.repository.count().await
    }

    /// Rooms derived from current memberships, with member counts
    pub async fn list_rooms(&self) -> Vec<(RoomId, usize)> {
        self.repository.list_rooms().await
    }

    /// `None` when nobody is in the room
    pub async fn room_detail(&self, room_id: &RoomId) -> Option<RoomDetail> {
        let mut members = Vec::new();
        for id in self.repository.members_of(room_id).await {
            // Members can leave between the two lookups
            if let Some(conn) = self.repository.get(&id).await {
                members.push(conn);
            }
        }
        if members.is_empty() {
            return None;
        }
        Some(RoomDetail {
            room_id: room_id.clone(),
            members,
            document_version: self.documents.version_of(room_id).await,
        })
    }
}
