//! Domain-level error types.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} is too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid email address: {0}")]
    InvalidEmail(String),
}

/// Repository errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Message push errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("connection '{0}' is not registered")]
    ConnectionNotFound(String),

    #[error("push failed: {0}")]
    PushFailed(String),
}

/// Token encode / decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token could not be encoded: {0}")]
    Encode(String),

    #[error("token is malformed or its signature does not verify: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordHashError(pub String);
