//! Conversion from domain entities to HTTP DTOs.

use tandem_shared::time::timestamp_to_rfc3339;

use crate::{
    domain::{Connection, Session, User},
    infrastructure::dto::http as dto,
};

impl From<&User> for dto::UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            display_name: user.display_name.clone(),
            email: user.email.to_string(),
            role: user.role,
            active: user.active,
            email_verified: user.email_verified,
            created_at: timestamp_to_rfc3339(user.created_at),
            last_active_at: timestamp_to_rfc3339(user.last_active_at),
        }
    }
}

impl From<&Session> for dto::SessionDto {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.to_string(),
            user_id: session.user_id.to_string(),
            created_at: timestamp_to_rfc3339(session.created_at),
            expires_at: timestamp_to_rfc3339(session.expires_at),
            ip: session.metadata.ip.clone(),
            device: session.metadata.device.clone(),
        }
    }
}

impl From<&Connection> for dto::RoomMemberDto {
    fn from(connection: &Connection) -> Self {
        Self {
            connection_id: connection.id.to_string(),
            user_id: connection.user_id.as_ref().map(ToString::to_string),
            display_name: connection.display_name.clone(),
            connected_at: timestamp_to_rfc3339(connection.joined_at),
        }
    }
}
