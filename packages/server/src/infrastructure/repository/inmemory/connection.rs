//! In-memory connection registry.
//!
//! Connections and the per-IP index live under one lock so a register or
//! remove can never leave them out of step.

use std::{
    collections::{BTreeMap, HashMap},
    net::IpAddr,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Connection, ConnectionId, ConnectionRepository, RepositoryError, RoomId, SessionId, UserId,
};

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    ip_counts: HashMap<IpAddr, usize>,
}

impl Registry {
    fn get_mut(&mut self, id: &ConnectionId) -> Result<&mut Connection, RepositoryError> {
        self.connections
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn member_count(&self, room_id: &RoomId) -> usize {
        self.connections
            .values()
            .filter(|c| c.rooms.contains(room_id))
            .count()
    }
}

#[derive(Default)]
pub struct InMemoryConnectionRepository {
    inner: Mutex<Registry>,
}

impl InMemoryConnectionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn register(
        &self,
        connection: Connection,
        max_per_ip: usize,
    ) -> Result<(), RepositoryError> {
        let mut registry = self.inner.lock().await;
        if registry.connections.contains_key(&connection.id) {
            return Err(RepositoryError::AlreadyExists(connection.id.to_string()));
        }
        let held = registry.ip_counts.get(&connection.ip).copied().unwrap_or(0);
        if held >= max_per_ip {
            return Err(RepositoryError::CapacityExceeded(format!(
                "{} already holds {} connections",
                connection.ip, held
            )));
        }
        registry.ip_counts.insert(connection.ip, held + 1);
        registry
            .connections
            .insert(connection.id.clone(), connection);
        Ok(())
    }

    async fn get(&self, id: &ConnectionId) -> Option<Connection> {
        let registry = self.inner.lock().await;
        registry.connections.get(id).cloned()
    }

    async fn remove(&self, id: &ConnectionId) -> Option<Connection> {
        let mut registry = self.inner.lock().await;
        let removed = registry.connections.remove(id)?;
        if let Some(count) = registry.ip_counts.get_mut(&removed.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                registry.ip_counts.remove(&removed.ip);
            }
        }
        Some(removed)
    }

    async fn bind_identity(
        &self,
        id: &ConnectionId,
        user_id: UserId,
        session_id: SessionId,
        display_name: String,
    ) -> Result<(), RepositoryError> {
        let mut registry = self.inner.lock().await;
        registry
            .get_mut(id)?
            .bind_identity(user_id, session_id, display_name);
        Ok(())
    }

    async fn touch(&self, id: &ConnectionId, now: i64) -> bool {
        let mut registry = self.inner.lock().await;
        match registry.connections.get_mut(id) {
            Some(connection) => {
                connection.touch(now);
                true
            }
            None => false,
        }
    }

    async fn mark_alive(&self, id: &ConnectionId) -> bool {
        let mut registry = self.inner.lock().await;
        match registry.connections.get_mut(id) {
            Some(connection) => {
                connection.is_alive = true;
                true
            }
            None => false,
        }
    }

    async fn try_consume_rate_limit(
        &self,
        id: &ConnectionId,
        now: i64,
    ) -> Option<Result<(), u64>> {
        let mut registry = self.inner.lock().await;
        registry
            .connections
            .get_mut(id)
            .map(|connection| connection.rate_limit.try_consume(now))
    }

    async fn join_room(
        &self,
        id: &ConnectionId,
        room_id: RoomId,
    ) -> Result<usize, RepositoryError> {
        let mut registry = self.inner.lock().await;
        registry.get_mut(id)?.join_room(room_id.clone());
        Ok(registry.member_count(&room_id))
    }

    async fn leave_room(
        &self,
        id: &ConnectionId,
        room_id: &RoomId,
    ) -> Result<bool, RepositoryError> {
        let mut registry = self.inner.lock().await;
        Ok(registry.get_mut(id)?.leave_room(room_id))
    }

    async fn leave_all_rooms(&self, id: &ConnectionId) -> Result<Vec<RoomId>, RepositoryError> {
        let mut registry = self.inner.lock().await;
        Ok(registry.get_mut(id)?.leave_all())
    }

    async fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        let registry = self.inner.lock().await;
        let mut members: Vec<ConnectionId> = registry
            .connections
            .values()
            .filter(|c| c.rooms.contains(room_id))
            .map(|c| c.id.clone())
            .collect();
        members.sort();
        members
    }

    async fn is_member(&self, id: &ConnectionId, room_id: &RoomId) -> bool {
        let registry = self.inner.lock().await;
        registry
            .connections
            .get(id)
            .is_some_and(|c| c.rooms.contains(room_id))
    }

    async fn list_rooms(&self) -> Vec<(RoomId, usize)> {
        let registry = self.inner.lock().await;
        let mut rooms: BTreeMap<RoomId, usize> = BTreeMap::new();
        for room_id in registry.connections.values().flat_map(|c| c.rooms.iter()) {
            *rooms.entry(room_id.clone()).or_default() += 1;
        }
        rooms.into_iter().collect()
    }

    async fn all_ids(&self) -> Vec<ConnectionId> {
        let registry = self.inner.lock().await;
        registry.connections.keys().cloned().collect()
    }

    async fn count(&self) -> usize {
        let registry = self.inner.lock().await;
        registry.connections.len()
    }

    async fn count_by_ip(&self, ip: &IpAddr) -> usize {
        let registry = self.inner.lock().await;
        registry.ip_counts.get(ip).copied().unwrap_or(0)
    }

    async fn begin_liveness_cycle(&self) -> (Vec<ConnectionId>, Vec<ConnectionId>) {
        let mut registry = self.inner.lock().await;
        let mut dead = Vec::new();
        let mut pinged = Vec::new();
        for connection in registry.connections.values_mut() {
            if connection.is_alive {
                connection.is_alive = false;
                pinged.push(connection.id.clone());
            } else {
                dead.push(connection.id.clone());
            }
        }
        (dead, pinged)
    }

    async fn idle_before(&self, cutoff: i64) -> Vec<ConnectionId> {
        let registry = self.inner.lock().await;
        registry
            .connections
            .values()
            .filter(|c| c.last_activity < cutoff)
            .map(|c| c.id.clone())
            .collect()
    }
}
