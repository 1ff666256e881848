//! User entity.

use tandem_shared::protocol::{UserProfile, UserRole};

use crate::domain::value_object::{Email, UserId};

/// Identity record. Users are never hard-deleted; `active` is flipped instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: Email,
    pub role: UserRole,
    pub active: bool,
    pub email_verified: bool,
    /// PHC-formatted password hash
    pub password_hash: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Unix timestamp in milliseconds
    pub last_active_at: i64,
}

impl User {
    pub fn new(
        display_name: String,
        email: Email,
        role: UserRole,
        password_hash: String,
        now: i64,
    ) -> Self {
        Self {
            id: UserId::generate(),
            display_name,
            email,
            role,
            active: true,
            email_verified: false,
            password_hash,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn touch(&mut self, now: i64) {
        self.last_active_at = self.last_active_at.max(now);
    }

    /// Redacted view safe to hand to other participants
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.as_str().to_string(),
            display_name: self.display_name.clone(),
            role: self.role,
        }
    }
}
