//! Identity & session service.
//!
//! Owns user and session records (through the repositories), the failed-login
//! counters, and outstanding password reset grants. The gateway only talks to
//! it through [`Authenticator`].
//!
//! Session lifetime:
//!
//! ```text
//! login ─▶ expires_at = now + token_expiration
//! use   ─▶ expires_at = min(now + token_expiration, created_at + session_expiration)
//! ```

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use tandem_shared::{protocol::UserRole, time::Clock};
use tokio::sync::{Mutex, OnceCell};

use crate::{
    config::{IdentityConfig, millis},
    domain::{
        AuthContext, Authenticator, Email, LoginAttemptTracker, PasswordHasher, Session,
        SessionId, SessionMetadata, SessionRepository, TokenClaims, TokenCodec, User, UserId,
        UserRepository,
    },
};

use super::error::IdentityError;

const DISPLAY_NAME_MAX_LEN: usize = 64;
const RESET_TOKEN_BYTES: usize = 32;
/// Hashed once and verified against when no usable account matches
const DUMMY_PASSWORD: &str = "tandem-dummy-password";

/// Registration input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub role: UserRole,
}

/// Successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: Session,
    pub token: String,
}

/// Always `success: true`; the token is only present for a real account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetGrant {
    pub success: bool,
    pub reset_token: Option<String>,
}

#[derive(Debug, Clone)]
struct ResetEntry {
    user_id: UserId,
    expires_at: i64,
}

pub struct IdentityService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    tokens: Arc<dyn TokenCodec>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    config: IdentityConfig,
    attempts: Mutex<LoginAttemptTracker>,
    reset_tokens: Mutex<HashMap<String, ResetEntry>>,
    dummy_hash: OnceCell<String>,
}

impl IdentityService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        tokens: Arc<dyn TokenCodec>,
        hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
        config: IdentityConfig,
    ) -> Self {
        let attempts = LoginAttemptTracker::new(config.max_login_attempts, millis(config.lockout));
        Self {
            users,
            sessions,
            tokens,
            hasher,
            clock,
            config,
            attempts: Mutex::new(attempts),
            reset_tokens: Mutex::new(HashMap::new()),
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub async fn register(&self, new_user: NewUser) -> Result<User, IdentityError> {
        let email =
            Email::new(&new_user.email).map_err(|e| IdentityError::InvalidInput(e.to_string()))?;
        let display_name = new_user.display_name.trim().to_string();
        if display_name.is_empty() || display_name.chars().count() > DISPLAY_NAME_MAX_LEN {
            return Err(IdentityError::InvalidInput(format!(
                "display name must be 1 to {} characters",
                DISPLAY_NAME_MAX_LEN
            )));
        }
        self.check_password_policy(&new_user.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(IdentityError::DuplicateIdentity);
        }

        let password_hash = self.hash_password(&new_user.password).await?;
        let user = User::new(
            display_name,
            email,
            new_user.role,
            password_hash,
            self.clock.now_millis(),
        );
        // The insert re-checks uniqueness under the store's lock
        self.users.insert(user.clone()).await?;

        tracing::info!("Registered user '{}' ({})", user.id, user.email);
        Ok(user)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        metadata: SessionMetadata,
    ) -> Result<LoginOutcome, IdentityError> {
        let key = email.trim().to_lowercase();
        let now = self.clock.now_millis();

        // The attempt counts as a failure until the password checks out, so
        // concurrent guesses cannot get past the limit
        let failures = if self.config.enable_rate_limiting {
            let reserved = self.attempts.lock().await.reserve(&key, now);
            match reserved {
                Ok(failures) => failures,
                Err(retry_after_ms) => {
                    tracing::warn!("Login refused for locked identity '{}'", key);
                    return Err(IdentityError::AccountLocked { retry_after_ms });
                }
            }
        } else {
            0
        };

        let user = match Email::new(email) {
            Ok(email) => self.users.find_by_email(&email).await?,
            Err(_) => None,
        };
        let verified = match &user {
            Some(user) if user.active => self.verify_password(password, &user.password_hash).await,
            _ => {
                self.verify_dummy(password).await;
                false
            }
        };
        let user = match user {
            Some(user) if verified => user,
            _ => {
                self.log_login_failure(&key, failures);
                return Err(IdentityError::InvalidCredentials);
            }
        };

        if self.config.enable_rate_limiting {
            self.attempts.lock().await.clear(&key);
        }
        if self.config.require_email_verification && !user.email_verified {
            return Err(IdentityError::EmailNotVerified);
        }

        let now = self.clock.now_millis();
        self.users.touch(&user.id, now).await?;
        let session = Session::new(
            user.id.clone(),
            metadata,
            now,
            millis(self.config.token_expiration),
        );
        self.sessions.insert(session.clone()).await?;
        let token = self.tokens.issue(&TokenClaims {
            sub: user.id.to_string(),
            sid: session.id.to_string(),
            iat: now / 1000,
            exp: session.expires_at / 1000,
        })?;

        let mut user = user;
        user.touch(now);
        tracing::info!("User '{}' logged in (session '{}')", user.id, session.id);
        Ok(LoginOutcome {
            user,
            session,
            token,
        })
    }

    fn log_login_failure(&self, key: &str, failures: u32) {
        if !self.config.enable_rate_limiting {
            return;
        }
        tracing::debug!("Failed login for '{}' ({} in window)", key, failures);
        if failures >= self.config.max_login_attempts {
            tracing::warn!(
                "Identity '{}' locked for {:?} after {} failed logins",
                key,
                self.config.lockout,
                failures
            );
        }
    }

    /// Returns `None` unless the token maps to a live session of an active
    /// user. A successful validation renews the session.
    pub async fn validate_token(&self, token: &str) -> Option<AuthContext> {
        let claims = match self.tokens.decode(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Token rejected: {}", e);
                return None;
            }
        };
        let session_id = SessionId::from(claims.sid);

        let session = self.sessions.find(&session_id).await.ok().flatten()?;
        if session.user_id.as_str() != claims.sub || !session.is_valid(self.clock.now_millis()) {
            return None;
        }
        let user = self.users.find_by_id(&session.user_id).await.ok().flatten()?;
        if !user.active {
            return None;
        }

        // Re-checked and renewed atomically; a logout may have run meanwhile
        let now = self.clock.now_millis();
        let session = self
            .sessions
            .renew(
                &session_id,
                now,
                millis(self.config.token_expiration),
                millis(self.config.session_expiration),
            )
            .await
            .ok()
            .flatten()?;
        if let Err(e) = self.users.touch(&user.id, now).await {
            tracing::warn!("Failed to record activity for user '{}': {}", user.id, e);
        }

        let mut user = user;
        user.touch(now);
        Some(AuthContext { user, session })
    }

    pub async fn logout(&self, session_id: &SessionId) -> Result<bool, IdentityError> {
        let revoked = self.sessions.revoke(session_id).await?;
        if revoked {
            tracing::info!("Session '{}' logged out", session_id);
        }
        Ok(revoked)
    }

    /// Idempotent; returns whether this call revoked the session
    pub async fn revoke_session(&self, session_id: &SessionId) -> Result<bool, IdentityError> {
        Ok(self.sessions.revoke(session_id).await?)
    }

    pub async fn revoke_all_sessions(
        &self,
        user_id: &UserId,
        except: Option<&SessionId>,
    ) -> Result<usize, IdentityError> {
        let count = self.sessions.revoke_for_user(user_id, except).await?;
        tracing::info!("Revoked {} session(s) of user '{}'", count, user_id);
        Ok(count)
    }

    /// Never reveals whether the email is registered
    pub async fn request_password_reset(&self, email: &str) -> PasswordResetGrant {
        let user = match Email::new(email) {
            Ok(email) => self.users.find_by_email(&email).await.unwrap_or_else(|e| {
                tracing::error!("Password reset lookup failed: {}", e);
                None
            }),
            Err(_) => None,
        };

        let reset_token = match user {
            Some(user) if user.active => {
                let token = generate_reset_token();
                let expires_at = self.clock.now_millis() + millis(self.config.reset_token_ttl);
                self.reset_tokens.lock().await.insert(
                    token.clone(),
                    ResetEntry {
                        user_id: user.id.clone(),
                        expires_at,
                    },
                );
                tracing::info!("Issued password reset token for user '{}'", user.id);
                Some(token)
            }
            _ => None,
        };

        PasswordResetGrant {
            success: true,
            reset_token,
        }
    }

    /// Single-use. Success revokes every session of the user.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.check_password_policy(new_password)?;

        let entry = self
            .reset_tokens
            .lock()
            .await
            .remove(reset_token)
            .ok_or(IdentityError::ResetTokenInvalid)?;
        if self.clock.now_millis() >= entry.expires_at {
            return Err(IdentityError::ResetTokenInvalid);
        }

        let mut user = self
            .users
            .find_by_id(&entry.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or(IdentityError::ResetTokenInvalid)?;
        user.password_hash = self.hash_password(new_password).await?;
        self.users.update(user.clone()).await?;

        self.revoke_all_sessions(&user.id, None).await?;
        self.attempts.lock().await.clear(user.email.as_str());
        tracing::info!("Password reset for user '{}'", user.id);
        Ok(())
    }

    /// Verifies the current password, then revokes every other session
    pub async fn change_password(
        &self,
        session_id: &SessionId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let session = self
            .sessions
            .find(session_id)
            .await?
            .filter(|s| s.is_valid(self.clock.now_millis()))
            .ok_or(IdentityError::SessionInvalidOrExpired)?;
        let mut user = self
            .users
            .find_by_id(&session.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or(IdentityError::SessionInvalidOrExpired)?;

        if !self
            .verify_password(current_password, &user.password_hash)
            .await
        {
            return Err(IdentityError::InvalidCredentials);
        }
        self.check_password_policy(new_password)?;

        user.password_hash = self.hash_password(new_password).await?;
        self.users.update(user.clone()).await?;
        self.revoke_all_sessions(&user.id, Some(session_id)).await?;
        Ok(())
    }

    pub async fn verify_email(&self, user_id: &UserId) -> Result<User, IdentityError> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| IdentityError::InvalidInput(format!("unknown user '{}'", user_id)))?;
        if !user.email_verified {
            user.email_verified = true;
            self.users.update(user.clone()).await?;
        }
        Ok(user)
    }

    /// Flip `active` off and revoke every session; returns how many were revoked
    pub async fn deactivate_user(&self, user_id: &UserId) -> Result<usize, IdentityError> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| IdentityError::InvalidInput(format!("unknown user '{}'", user_id)))?;
        user.active = false;
        self.users.update(user).await?;
        let revoked = self.revoke_all_sessions(user_id, None).await?;
        tracing::info!("Deactivated user '{}'", user_id);
        Ok(revoked)
    }

    /// Active, unexpired sessions of the user, oldest first
    pub async fn list_sessions(&self, user_id: &UserId) -> Result<Vec<Session>, IdentityError> {
        let now = self.clock.now_millis();
        Ok(self
            .sessions
            .find_by_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.is_valid(now))
            .collect())
    }

    /// Purge expired sessions, reset grants, and lockout records; returns the
    /// number of sessions purged
    pub async fn sweep_expired(&self) -> Result<usize, IdentityError> {
        let now = self.clock.now_millis();
        let purged = self.sessions.purge_expired(now).await?;
        self.reset_tokens
            .lock()
            .await
            .retain(|_, entry| now < entry.expires_at);
        self.attempts.lock().await.purge_expired(now);
        if purged > 0 {
            tracing::debug!("Purged {} expired session(s)", purged);
        }
        Ok(purged)
    }

    /// Argon2 is CPU-bound; keep it off the runtime workers
    async fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| IdentityError::Internal(e.to_string()))?
            .map_err(IdentityError::from)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let hasher = self.hasher.clone();
        let (password, hash) = (password.to_string(), hash.to_string());
        match tokio::task::spawn_blocking(move || hasher.verify(&password, &hash)).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!("Password verification task failed: {}", e);
                false
            }
        }
    }

    /// Spend the same work on a missing or inactive account as on a wrong
    /// password, so response time does not reveal registered emails
    async fn verify_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hash_password(DUMMY_PASSWORD))
            .await;
        match dummy {
            Ok(hash) => {
                self.verify_password(password, hash).await;
            }
            Err(e) => tracing::error!("Failed to prepare dummy password hash: {}", e),
        }
    }

    fn check_password_policy(&self, password: &str) -> Result<(), IdentityError> {
        if password.chars().count() < self.config.min_password_length {
            return Err(IdentityError::InvalidInput(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Authenticator for IdentityService {
    async fn validate_token(&self, token: &str) -> Option<AuthContext> {
        IdentityService::validate_token(self, token).await
    }
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
