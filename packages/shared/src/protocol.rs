//! WebSocket wire protocol.
//!
//! Every frame is a JSON object `{ "type": ..., ...fields }`. Each direction
//! has its own closed enum so handlers match exhaustively instead of probing
//! payload shapes at runtime.
//!
//! ```text
//! client ──auth──────────────▶ gateway ──auth_success─▶ client
//! client ──join{roomId}──────▶ gateway ──room_joined──▶ client
//! client ──cursor/chat/edit──▶ gateway ──cursor/...───▶ other room members
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operation::Operation;

/// Close codes sent by the gateway before terminating a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Server is shutting down
    GoingAway,
    /// Inactivity or failed liveness check
    Inactivity,
    /// Origin is not allow-listed
    DisallowedOrigin,
    /// Per-IP connection cap reached
    IpLimitReached,
    /// Authentication failed or timed out
    AuthenticationFailed,
}

impl CloseCode {
    pub const fn code(self) -> u16 {
        match self {
            CloseCode::GoingAway => 1001,
            CloseCode::Inactivity => 4000,
            CloseCode::DisallowedOrigin => 4001,
            CloseCode::IpLimitReached => 4002,
            CloseCode::AuthenticationFailed => 4003,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1001 => Some(CloseCode::GoingAway),
            4000 => Some(CloseCode::Inactivity),
            4001 => Some(CloseCode::DisallowedOrigin),
            4002 => Some(CloseCode::IpLimitReached),
            4003 => Some(CloseCode::AuthenticationFailed),
            _ => None,
        }
    }

    /// Rejections that will fail again on an identical retry
    pub fn is_terminal_rejection(self) -> bool {
        matches!(
            self,
            CloseCode::DisallowedOrigin | CloseCode::IpLimitReached | CloseCode::AuthenticationFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Guest,
    User,
    Admin,
}

/// Redacted user profile sent to other parties (no email, no credentials)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

/// Partial presence update; absent fields leave the stored value unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PresenceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContent {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    pub timestamp: i64,
}

/// Identity of the connection a relayed message came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRef {
    pub connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl PeerRef {
    /// Key used to track this peer in presence maps
    pub fn presence_key(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.connection_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AuthRequired,
    AlreadyAuthenticated,
    RateLimited,
    MessageTooLarge,
    MalformedMessage,
    NotInRoom,
    StaleVersion,
    FutureVersion,
    UnresolvedConflict,
    Internal,
}

/// Client → gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    Ping,
    Join {
        room_id: String,
    },
    /// Without a room id the connection leaves every room
    Leave {
        #[serde(default)]
        room_id: Option<String>,
    },
    Broadcast {
        room_id: String,
        payload: Value,
        #[serde(default)]
        include_self: bool,
    },
    Cursor {
        room_id: String,
        position: CursorPosition,
        path: String,
    },
    Selection {
        room_id: String,
        range: SelectionRange,
        path: String,
    },
    Chat {
        room_id: String,
        message: ChatContent,
    },
    Edit {
        room_id: String,
        path: String,
        changes: Vec<Operation>,
    },
    Presence {
        room_id: String,
        update: PresenceUpdate,
    },
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Auth { .. } => "auth",
            ClientMessage::Ping => "ping",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave { .. } => "leave",
            ClientMessage::Broadcast { .. } => "broadcast",
            ClientMessage::Cursor { .. } => "cursor",
            ClientMessage::Selection { .. } => "selection",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::Edit { .. } => "edit",
            ClientMessage::Presence { .. } => "presence",
        }
    }
}

/// Gateway → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AuthRequired {
        timeout_ms: u64,
    },
    AuthSuccess {
        user: UserProfile,
        session_id: String,
    },
    Pong {
        timestamp: i64,
    },
    RoomJoined {
        room_id: String,
        member_count: usize,
    },
    LeftRoom {
        room_id: String,
    },
    LeftAllRooms {
        room_ids: Vec<String>,
    },
    Broadcast {
        room_id: String,
        from: PeerRef,
        payload: Value,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_version: Option<u64>,
    },
    Cursor {
        room_id: String,
        from: PeerRef,
        position: CursorPosition,
        path: String,
    },
    Selection {
        room_id: String,
        from: PeerRef,
        range: SelectionRange,
        path: String,
    },
    Chat {
        room_id: String,
        from: PeerRef,
        message: ChatContent,
    },
    Edit {
        room_id: String,
        from: PeerRef,
        path: String,
        changes: Vec<Operation>,
    },
    Presence {
        room_id: String,
        from: PeerRef,
        update: PresenceUpdate,
    },
    UserLeft {
        room_id: String,
        from: PeerRef,
    },
}

impl ServerMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
            retry_after_ms: None,
            current_version: None,
        }
    }
}
