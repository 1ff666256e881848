//! Session entity.

use crate::domain::value_object::{SessionId, UserId};

/// Free-form client metadata captured at login
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub ip: Option<String>,
    pub device: Option<String>,
}

/// A login session. Valid only while `active` and `now < expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Unix timestamp in milliseconds
    pub expires_at: i64,
    pub metadata: SessionMetadata,
    pub active: bool,
}

impl Session {
    pub fn new(user_id: UserId, metadata: SessionMetadata, now: i64, ttl_millis: i64) -> Self {
        Self {
            id: SessionId::generate(),
            user_id,
            created_at: now,
            expires_at: now + ttl_millis,
            metadata,
            active: true,
        }
    }

    pub fn is_valid(&self, now: i64) -> bool {
        self.active && now < self.expires_at
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Revocation is idempotent; returns whether this call changed the state
    pub fn revoke(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    /// Slide the expiry forward, never past `created_at + max_lifetime_millis`
    pub fn renew(&mut self, now: i64, ttl_millis: i64, max_lifetime_millis: i64) {
        let ceiling = self.created_at + max_lifetime_millis;
        self.expires_at = self.expires_at.max((now + ttl_millis).min(ceiling));
    }
}
