use std::ops::Deref;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::{CacheConfig, CacheStore, Database, Index, Store, StoreError, StoreIndexes};
use crate::domain::entities::{User, UserEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
}

#[derive(Debug, Default)]
pub struct UserIndexes {
    by_login: Index<String>,
    by_account: Index<i64>,
}

impl StoreIndexes for UserIndexes {
    type Object = User;
    type Event = UserEvent;

    const NAME: &'static str = "users";

    fn index(&mut self, user: &User) {
        self.by_login.insert(user.login.clone(), user.id);
        self.by_account.insert(user.account_id, user.id);
    }

    fn unindex(&mut self, user: &User) {
        self.by_login.remove(&user.login, user.id);
        self.by_account.remove(&user.account_id, user.id);
    }
}

impl<D: Database> CacheStore<UserIndexes, D> {
    pub fn get_by_login(&self, login: &str) -> Option<User> {
        self.read(|snapshot| {
            let id = snapshot.indexes().by_login.first(login)?;
            snapshot.get(id).cloned()
        })
    }

    pub fn get_by_account(&self, account_id: i64) -> Option<User> {
        self.read(|snapshot| {
            let id = snapshot.indexes().by_account.first(&account_id)?;
            snapshot.get(id).cloned()
        })
    }
}

/// User store plus the installation-wide password salt.
pub struct UserStore<D: Database> {
    store: CacheStore<UserIndexes, D>,
    salt: String,
}

impl<D: Database> UserStore<D> {
    pub fn new(
        db: D,
        table: &str,
        event_table: &str,
        config: CacheConfig,
        salt: impl Into<String>,
    ) -> Self {
        Self {
            store: CacheStore::new(db, table, event_table, config),
            salt: salt.into(),
        }
    }

    /// Replaces the password of `user` in memory with a fresh per-user
    /// salt. The caller persists the change with `update`.
    pub fn set_password(&self, user: &mut User, password: &str) -> Result<(), PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }
        user.password_salt = Uuid::new_v4().simple().to_string();
        user.password_hash = self.hash_password(password, &user.password_salt);
        Ok(())
    }

    pub fn check_password(&self, user: &User, password: &str) -> bool {
        let expected = self.hash_password(password, &user.password_salt);
        expected
            .as_bytes()
            .ct_eq(user.password_hash.as_bytes())
            .unwrap_u8()
            == 1
    }

    fn hash_password(&self, password: &str, user_salt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_salt.as_bytes());
        hasher.update(password.as_bytes());
        hasher.update(self.salt.as_bytes());
        STANDARD.encode(hasher.finalize())
    }
}

impl<D: Database> Deref for UserStore<D> {
    type Target = CacheStore<UserIndexes, D>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[async_trait]
impl<D: Database> Store for UserStore<D> {
    fn name(&self) -> &'static str {
        self.store.name()
    }

    async fn init(&self) -> Result<(), StoreError> {
        self.store.init().await
    }

    async fn sync(&self) -> Result<usize, StoreError> {
        self.store.sync().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::db::MemoryDatabase;

    fn users(salt: &str) -> UserStore<MemoryDatabase> {
        UserStore::new(
            MemoryDatabase::new(),
            "user",
            "user_event",
            CacheConfig::default(),
            salt,
        )
    }

    #[test]
    fn password_round_trip() {
        let store = users("global-salt");
        let mut user = User {
            login: "alice".to_string(),
            ..User::default()
        };
        store.set_password(&mut user, "correct horse").unwrap();

        assert_eq!(user.password_salt.len(), 32);
        assert_ne!(user.password_hash, "correct horse");
        assert!(store.check_password(&user, "correct horse"));
        assert!(!store.check_password(&user, "wrong horse"));
    }

    #[test]
    fn global_salt_changes_hash() {
        let mut user = User::default();
        users("one").set_password(&mut user, "secret").unwrap();
        assert!(!users("two").check_password(&user, "secret"));
    }

    #[test]
    fn empty_password_is_rejected() {
        let mut user = User::default();
        assert_eq!(
            users("salt").set_password(&mut user, ""),
            Err(PasswordError::Empty)
        );
        assert!(user.password_hash.is_empty());
    }

    #[tokio::test]
    async fn lookups_by_login_and_account() {
        let store = users("salt");
        store.init().await.unwrap();
        let created = store
            .create(User {
                account_id: 4,
                login: "bob".to_string(),
                ..User::default()
            })
            .await
            .unwrap();
        store.sync().await.unwrap();

        assert_eq!(store.get_by_login("bob"), Some(created.clone()));
        assert_eq!(store.get_by_account(4), Some(created));
        assert_eq!(store.get_by_login("carol"), None);
    }
}
