//! UseCase-level error types.

use std::{net::IpAddr, time::Duration};

use tandem_shared::protocol::{CloseCode, ErrorCode};
use thiserror::Error;

use crate::domain::{PasswordHashError, RepositoryError, ResolveError, TokenError};

/// Identity & session service errors. User-facing, so none of them reveals
/// whether an email is registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("an account with this email already exists")]
    DuplicateIdentity,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account locked, retry in {} seconds", .retry_after_ms.div_ceil(1000))]
    AccountLocked { retry_after_ms: u64 },

    #[error("session is invalid or expired")]
    SessionInvalidOrExpired,

    #[error("password reset token is invalid or expired")]
    ResetTokenInvalid,

    #[error("email address has not been verified")]
    EmailNotVerified,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            IdentityError::AccountLocked { retry_after_ms } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

impl From<RepositoryError> for IdentityError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::AlreadyExists(_) => IdentityError::DuplicateIdentity,
            other => IdentityError::Internal(other.to_string()),
        }
    }
}

impl From<PasswordHashError> for IdentityError {
    fn from(e: PasswordHashError) -> Self {
        IdentityError::Internal(e.to_string())
    }
}

impl From<TokenError> for IdentityError {
    fn from(e: TokenError) -> Self {
        IdentityError::Internal(e.to_string())
    }
}

/// Reasons a transport connection is refused at accept time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionRejected {
    #[error("origin '{0}' is not allowed")]
    DisallowedOrigin(String),

    #[error("connection limit reached for {0}")]
    IpLimitReached(IpAddr),

    #[error("connection could not be registered: {0}")]
    Internal(String),
}

impl ConnectionRejected {
    pub fn close_code(&self) -> CloseCode {
        match self {
            ConnectionRejected::DisallowedOrigin(_) => CloseCode::DisallowedOrigin,
            ConnectionRejected::IpLimitReached(_) => CloseCode::IpLimitReached,
            ConnectionRejected::Internal(_) => CloseCode::GoingAway,
        }
    }
}

/// Per-message gateway errors. All but the authentication ones are answered
/// with an `error` frame and leave the connection open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("authentication timed out")]
    AuthenticationTimeout,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("connection is already authenticated")]
    AlreadyAuthenticated,

    #[error("rate limit exceeded, retry in {retry_after_ms} ms")]
    RateLimitExceeded { retry_after_ms: u64 },

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("not a member of room '{0}'")]
    NotInRoom(String),

    #[error(transparent)]
    Conflict(#[from] ResolveError),

    #[error("connection is gone")]
    ConnectionGone,
}

impl GatewayError {
    /// Wire error code for the `error` frame
    pub fn error_code(&self) -> ErrorCode {
        match self {
            GatewayError::AuthenticationTimeout
            | GatewayError::AuthenticationFailed
            | GatewayError::AuthenticationRequired => ErrorCode::AuthRequired,
            GatewayError::AlreadyAuthenticated => ErrorCode::AlreadyAuthenticated,
            GatewayError::RateLimitExceeded { .. } => ErrorCode::RateLimited,
            GatewayError::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
            GatewayError::MalformedMessage(_) => ErrorCode::MalformedMessage,
            GatewayError::NotInRoom(_) => ErrorCode::NotInRoom,
            GatewayError::Conflict(ResolveError::StaleVersion { .. }) => ErrorCode::StaleVersion,
            GatewayError::Conflict(ResolveError::FutureVersion { .. }) => ErrorCode::FutureVersion,
            GatewayError::Conflict(ResolveError::UnresolvedConflict { .. }) => {
                ErrorCode::UnresolvedConflict
            }
            GatewayError::ConnectionGone => ErrorCode::Internal,
        }
    }

    /// Close code when the error terminates the connection
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            GatewayError::AuthenticationTimeout | GatewayError::AuthenticationFailed => {
                Some(CloseCode::AuthenticationFailed)
            }
            _ => None,
        }
    }
}
