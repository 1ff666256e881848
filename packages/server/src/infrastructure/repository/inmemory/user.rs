//! In-memory user store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Email, RepositoryError, User, UserId, UserRepository};

#[derive(Default)]
struct Users {
    by_id: HashMap<UserId, User>,
    id_by_email: HashMap<Email, UserId>,
}

/// `UserRepository` over two maps kept in step under one lock
#[derive(Default)]
pub struct InMemoryUserRepository {
    inner: Mutex<Users>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.inner.lock().await;
        if users.id_by_email.contains_key(&user.email) {
            return Err(RepositoryError::AlreadyExists(user.email.to_string()));
        }
        users.id_by_email.insert(user.email.clone(), user.id.clone());
        users.by_id.insert(user.id.clone(), user);
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.inner.lock().await;
        Ok(users.by_id.get(id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let users = self.inner.lock().await;
        Ok(users
            .id_by_email
            .get(email)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn update(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.inner.lock().await;
        let Some(existing) = users.by_id.get(&user.id) else {
            return Err(RepositoryError::NotFound(user.id.to_string()));
        };
        if existing.email != user.email {
            if users.id_by_email.contains_key(&user.email) {
                return Err(RepositoryError::AlreadyExists(user.email.to_string()));
            }
            let old_email = existing.email.clone();
            users.id_by_email.remove(&old_email);
            users.id_by_email.insert(user.email.clone(), user.id.clone());
        }
        users.by_id.insert(user.id.clone(), user);
        Ok(())
    }

    async fn touch(&self, id: &UserId, now: i64) -> Result<(), RepositoryError> {
        let mut users = self.inner.lock().await;
        match users.by_id.get_mut(id) {
            Some(user) => {
                user.touch(now);
                Ok(())
            }
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_shared::protocol::UserRole;

    fn create_user(email: &str) -> User {
        User::new(
            "Test".to_string(),
            Email::new(email).unwrap(),
            UserRole::User,
            "hash".to_string(),
            0,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find_by_email() {
        // テスト項目: 登録したユーザーを正規化済みメールアドレスで検索できる
        // given (前提条件):
        let repo = InMemoryUserRepository::new();
        let user = create_user("test@example.com");

        // when (操作):
        repo.insert(user.clone()).await.unwrap();
        let found = repo
            .find_by_email(&Email::new("TEST@example.com").unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(found, Some(user));
    }

    #[tokio::test]
    async fn test_insert_duplicate_email_fails() {
        // テスト項目: 同じメールアドレスでの二重登録はエラーになる
        // given (前提条件):
        let repo = InMemoryUserRepository::new();
        repo.insert(create_user("test@example.com")).await.unwrap();

        // when (操作):
        let result = repo.insert(create_user("test@example.com")).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(RepositoryError::AlreadyExists("test@example.com".to_string()))
        );
    }

    #[tokio::test]
    async fn test_update_unknown_user_fails() {
        // テスト項目: 未登録ユーザーの更新は NotFound になる
        // given (前提条件):
        let repo = InMemoryUserRepository::new();

        // when (操作):
        let result = repo.update(create_user("ghost@example.com")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_persists_changes() {
        // テスト項目: 更新内容が反映される
        // given (前提条件):
        let repo = InMemoryUserRepository::new();
        let mut user = create_user("test@example.com");
        repo.insert(user.clone()).await.unwrap();

        // when (操作):
        user.active = false;
        repo.update(user.clone()).await.unwrap();

        // then (期待する結果):
        let found = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(!found.active);
    }

    #[tokio::test]
    async fn test_touch_only_moves_last_active_forward() {
        // テスト項目: touch は last_active_at を進めるだけで、巻き戻さない
        // given (前提条件):
        let repo = InMemoryUserRepository::new();
        let user = create_user("test@example.com");
        repo.insert(user.clone()).await.unwrap();

        // when (操作):
        repo.touch(&user.id, 500).await.unwrap();
        repo.touch(&user.id, 100).await.unwrap();

        // then (期待する結果):
        let found = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(found.last_active_at, 500);
        assert_eq!(found.password_hash, "hash");
    }
}
