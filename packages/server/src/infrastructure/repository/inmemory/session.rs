//! In-memory session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{RepositoryError, Session, SessionId, SessionRepository, UserId};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.id) {
            return Err(RepositoryError::AlreadyExists(session.id.to_string()));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(id).cloned())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.lock().await;
        let mut owned: Vec<Session> = sessions
            .values()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.created_at);
        Ok(owned)
    }

    async fn renew(
        &self,
        id: &SessionId,
        now: i64,
        ttl_millis: i64,
        max_lifetime_millis: i64,
    ) -> Result<Option<Session>, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions
            .get_mut(id)
            .filter(|s| s.is_valid(now))
            .map(|session| {
                session.renew(now, ttl_millis, max_lifetime_millis);
                session.clone()
            }))
    }

    async fn revoke(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.get_mut(id).is_some_and(Session::revoke))
    }

    async fn revoke_for_user(
        &self,
        user_id: &UserId,
        keep: Option<&SessionId>,
    ) -> Result<usize, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let revoked = sessions
            .values_mut()
            .filter(|s| &s.user_id == user_id && Some(&s.id) != keep)
            .map(Session::revoke)
            .filter(|changed| *changed)
            .count();
        Ok(revoked)
    }

    async fn purge_expired(&self, now: i64) -> Result<usize, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok(before - sessions.len())
    }
}
