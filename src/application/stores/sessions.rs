use time::OffsetDateTime;

use crate::cache::{CacheStore, Database, Index, StoreIndexes};
use crate::domain::entities::{Session, SessionEvent};

#[derive(Debug, Default)]
pub struct SessionIndexes {
    by_account: Index<i64>,
}

impl StoreIndexes for SessionIndexes {
    type Object = Session;
    type Event = SessionEvent;

    const NAME: &'static str = "sessions";

    fn index(&mut self, session: &Session) {
        self.by_account.insert(session.account_id, session.id);
    }

    fn unindex(&mut self, session: &Session) {
        self.by_account.remove(&session.account_id, session.id);
    }
}

pub type SessionStore<D> = CacheStore<SessionIndexes, D>;

impl<D: Database> CacheStore<SessionIndexes, D> {
    pub fn find_by_account(&self, account_id: i64) -> Vec<Session> {
        self.read(|snapshot| snapshot.select(snapshot.indexes().by_account.get(&account_id)))
    }

    /// Sessions of `account_id` that have not expired at `now`.
    pub fn active_for_account(&self, account_id: i64, now: OffsetDateTime) -> Vec<Session> {
        self.find_by_account(account_id)
            .into_iter()
            .filter(|session| !session.is_expired(now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::cache::{CacheConfig, Store};
    use crate::infra::db::MemoryDatabase;

    #[tokio::test]
    async fn expired_sessions_are_filtered() {
        let now = datetime!(2024-05-01 12:00 UTC).unix_timestamp();
        let db = MemoryDatabase::new();
        let sessions = SessionStore::new(db, "session", "session_event", CacheConfig::default());
        sessions.init().await.unwrap();

        for expire_time in [now - 60, now + 60] {
            sessions
                .create(Session {
                    account_id: 3,
                    secret: "s3cr3t".to_string(),
                    create_time: now - 120,
                    expire_time,
                    ..Session::default()
                })
                .await
                .unwrap();
        }
        sessions.sync().await.unwrap();

        assert_eq!(sessions.find_by_account(3).len(), 2);
        let active = sessions.active_for_account(3, datetime!(2024-05-01 12:00 UTC));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].expire_time, now + 60);
    }
}
