//! Authentication seams.
//!
//! - [`TokenCodec`]: signs and verifies bearer tokens
//! - [`PasswordHasher`]: one-way credential hashing
//! - [`Authenticator`]: what the gateway asks per connection

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    entity::{Session, User},
    error::{PasswordHashError, TokenError},
};

/// Bearer token payload. Times are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id
    pub sub: String,
    /// Session id
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

pub trait TokenCodec: Send + Sync {
    fn issue(&self, claims: &TokenClaims) -> Result<String, TokenError>;

    /// Verify the signature and return the claims. Expiry is judged by the
    /// session record, not here.
    fn decode(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError>;

    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// A validated token's user and (renewed) session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `None` for any token that does not map to a live session of an
    /// active user
    async fn validate_token(&self, token: &str) -> Option<AuthContext>;
}
