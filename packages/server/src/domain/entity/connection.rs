//! Connection entity.

use std::{collections::HashSet, net::IpAddr};

use tandem_shared::protocol::PeerRef;

use crate::domain::{
    rate_limit::TokenBucket,
    value_object::{ConnectionId, RoomId, SessionId, UserId},
};

/// Transport-level handle owned by the gateway.
///
/// `user_id` / `session_id` stay `None` until the auth handshake completes.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub ip: IpAddr,
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
    pub display_name: Option<String>,
    /// Cleared by each heartbeat ping, set again when the pong arrives
    pub is_alive: bool,
    /// Unix timestamp in milliseconds
    pub last_activity: i64,
    /// Unix timestamp in milliseconds
    pub joined_at: i64,
    pub rooms: HashSet<RoomId>,
    pub rate_limit: TokenBucket,
}

impl Connection {
    pub fn new(id: ConnectionId, ip: IpAddr, rate_limit: TokenBucket, now: i64) -> Self {
        Self {
            id,
            ip,
            user_id: None,
            session_id: None,
            display_name: None,
            is_alive: true,
            last_activity: now,
            joined_at: now,
            rooms: HashSet::new(),
            rate_limit,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn bind_identity(&mut self, user_id: UserId, session_id: SessionId, display_name: String) {
        self.user_id = Some(user_id);
        self.session_id = Some(session_id);
        self.display_name = Some(display_name);
    }

    /// Returns `false` when already a member
    pub fn join_room(&mut self, room_id: RoomId) -> bool {
        self.rooms.insert(room_id)
    }

    /// Returns `false` when not a member
    pub fn leave_room(&mut self, room_id: &RoomId) -> bool {
        self.rooms.remove(room_id)
    }

    /// Leave every room, returning the rooms left (sorted)
    pub fn leave_all(&mut self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.rooms.drain().collect();
        rooms.sort();
        rooms
    }

    pub fn touch(&mut self, now: i64) {
        self.last_activity = self.last_activity.max(now);
    }

    /// How this connection is identified to other room members
    pub fn peer_ref(&self) -> PeerRef {
        PeerRef {
            connection_id: self.id.as_str().to_string(),
            user_id: self.user_id.as_ref().map(|id| id.as_str().to_string()),
            display_name: self.display_name.clone(),
        }
    }
}
