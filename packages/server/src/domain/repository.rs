//! Repository traits.
//!
//! The domain defines the data access it needs; the infrastructure layer
//! provides the implementations (dependency inversion). Use cases depend on
//! these traits only, so the identity store can be swapped for a shared one
//! in multi-process deployments.

use std::net::IpAddr;

use async_trait::async_trait;

use super::{
    entity::{Connection, Session, User},
    error::RepositoryError,
    value_object::{ConnectionId, Email, RoomId, SessionId, UserId},
};

/// Users keyed by id, unique by normalized email
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// `AlreadyExists` when the email is taken
    async fn insert(&self, user: User) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// `NotFound` when the user was never inserted
    async fn update(&self, user: User) -> Result<(), RepositoryError>;

    /// Bump `last_active_at` without rewriting the rest of the record
    async fn touch(&self, id: &UserId, now: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: Session) -> Result<(), RepositoryError>;

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;

    /// Every stored session of the user, active or not
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError>;

    /// Slide the expiry of a still-valid session in one step, so a concurrent
    /// revoke is never overwritten. `None` when the session is gone or no
    /// longer valid at `now`.
    async fn renew(
        &self,
        id: &SessionId,
        now: i64,
        ttl_millis: i64,
        max_lifetime_millis: i64,
    ) -> Result<Option<Session>, RepositoryError>;

    /// Returns whether this call deactivated the session
    async fn revoke(&self, id: &SessionId) -> Result<bool, RepositoryError>;

    /// Revoke every active session of the user except `keep`; returns how many
    async fn revoke_for_user(
        &self,
        user_id: &UserId,
        keep: Option<&SessionId>,
    ) -> Result<usize, RepositoryError>;

    /// Physically remove sessions whose expiry has passed; returns how many
    async fn purge_expired(&self, now: i64) -> Result<usize, RepositoryError>;
}

/// Gateway connection registry, including the per-IP index.
///
/// Rooms are not stored separately; they are derived from the membership
/// sets of the registered connections.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// `CapacityExceeded` when the source IP already holds `max_per_ip`
    /// connections
    async fn register(
        &self,
        connection: Connection,
        max_per_ip: usize,
    ) -> Result<(), RepositoryError>;

    /// Snapshot of the connection
    async fn get(&self, id: &ConnectionId) -> Option<Connection>;

    /// Remove the connection and release its IP slot
    async fn remove(&self, id: &ConnectionId) -> Option<Connection>;

    async fn bind_identity(
        &self,
        id: &ConnectionId,
        user_id: UserId,
        session_id: SessionId,
        display_name: String,
    ) -> Result<(), RepositoryError>;

    /// Record activity; `false` when the connection is gone
    async fn touch(&self, id: &ConnectionId, now: i64) -> bool;

    /// Pong received
    async fn mark_alive(&self, id: &ConnectionId) -> bool;

    /// `None` when the connection is gone, `Some(Err(retry_after_ms))` when
    /// its message budget is exhausted
    async fn try_consume_rate_limit(
        &self,
        id: &ConnectionId,
        now: i64,
    ) -> Option<Result<(), u64>>;

    /// Returns the room's member count after joining
    async fn join_room(&self, id: &ConnectionId, room_id: RoomId)
    -> Result<usize, RepositoryError>;

    /// Returns whether the connection was a member
    async fn leave_room(&self, id: &ConnectionId, room_id: &RoomId)
    -> Result<bool, RepositoryError>;

    async fn leave_all_rooms(&self, id: &ConnectionId) -> Result<Vec<RoomId>, RepositoryError>;

    /// Connections whose membership set contains `room_id`
    async fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId>;

    async fn is_member(&self, id: &ConnectionId, room_id: &RoomId) -> bool;

    /// Every non-empty room with its member count, sorted by room id
    async fn list_rooms(&self) -> Vec<(RoomId, usize)>;

    async fn all_ids(&self) -> Vec<ConnectionId>;

    async fn count(&self) -> usize;

    async fn count_by_ip(&self, ip: &IpAddr) -> usize;

    /// One heartbeat cycle: connections still flagged dead from the previous
    /// cycle are returned for termination, every other connection is flagged
    /// dead and returned for probing.
    async fn begin_liveness_cycle(&self) -> (Vec<ConnectionId>, Vec<ConnectionId>);

    /// Connections whose last activity is strictly before `cutoff`
    async fn idle_before(&self, cutoff: i64) -> Vec<ConnectionId>;
}
