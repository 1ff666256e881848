//! Value objects.
//!
//! Identifiers are opaque strings wrapped in newtypes so the compiler keeps
//! connection ids, session ids, and user ids apart.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValueObjectError;

const ROOM_ID_MAX_LEN: usize = 256;
const EMAIL_MAX_LEN: usize = 320;

macro_rules! generated_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

generated_id!(
    /// Gateway-assigned id of a transport connection
    ConnectionId
);
generated_id!(UserId);
generated_id!(SessionId);

/// Logical broadcast group id (typically a document id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.trim().is_empty() {
            return Err(ValueObjectError::Empty("room id"));
        }
        if value.chars().count() > ROOM_ID_MAX_LEN {
            return Err(ValueObjectError::TooLong {
                field: "room id",
                max: ROOM_ID_MAX_LEN,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RoomId {
    type Error = ValueObjectError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized (trimmed, lowercased) email address; the unique identity key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn new(value: &str) -> Result<Self, ValueObjectError> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ValueObjectError::Empty("email"));
        }
        if normalized.len() > EMAIL_MAX_LEN {
            return Err(ValueObjectError::TooLong {
                field: "email",
                max: EMAIL_MAX_LEN,
            });
        }
        match normalized.split_once('@') {
            Some((local, domain))
                if !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !normalized.contains(char::is_whitespace) =>
            {
                Ok(Self(normalized))
            }
            _ => Err(ValueObjectError::InvalidEmail(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        // テスト項目: 生成された ID が重複しない
        // when (操作):
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        // then (期待する結果):
        assert_ne!(a, b);
    }

    #[test]
    fn test_room_id_rejects_blank() {
        // テスト項目: 空白のみの RoomId はエラーになる
        // when (操作):
        let result = RoomId::new("   ".to_string());

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::Empty("room id")));
    }

    #[test]
    fn test_room_id_rejects_too_long() {
        // テスト項目: 上限を超える長さの RoomId はエラーになる
        // when (操作):
        let result = RoomId::new("x".repeat(ROOM_ID_MAX_LEN + 1));

        // then (期待する結果):
        assert!(matches!(result, Err(ValueObjectError::TooLong { .. })));
    }

    #[test]
    fn test_email_is_normalized() {
        // テスト項目: Email は前後の空白を除去し小文字化される
        // when (操作):
        let email = Email::new("  Test@Example.COM ").unwrap();

        // then (期待する結果):
        assert_eq!(email.as_str(), "test@example.com");
    }

    #[test]
    fn test_email_rejects_invalid_shapes() {
        // テスト項目: 不正な形式の Email はエラーになる
        for raw in ["", "no-at-sign", "@example.com", "user@", "a@b@c", "a b@c.d"] {
            assert!(Email::new(raw).is_err(), "{raw:?} should be rejected");
        }
    }
}
