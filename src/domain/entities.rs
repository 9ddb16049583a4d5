//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::cache::{Column, Event, Object};

/// Key/value runtime setting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub id: i64,
    pub key: String,
    pub value: String,
}

impl Object for Setting {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![
            ("key", self.key.clone().into()),
            ("value", self.value.clone().into()),
        ]
    }
}

pub type SettingEvent = Event<Setting>;

/// Named permission or group of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

impl Object for Role {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![("name", self.name.clone().into())]
    }
}

pub type RoleEvent = Event<Role>;

/// Grants role `child_id` to every holder of role `role_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoleEdge {
    pub id: i64,
    pub role_id: i64,
    pub child_id: i64,
}

impl Object for RoleEdge {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![
            ("role_id", self.role_id.into()),
            ("child_id", self.child_id.into()),
        ]
    }
}

pub type RoleEdgeEvent = Event<RoleEdge>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    User,
}

impl AccountKind {
    pub fn code(self) -> i64 {
        match self {
            Self::User => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::User),
            _ => None,
        }
    }
}

/// Principal that can hold roles and sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub kind: i64,
}

impl Account {
    pub fn account_kind(&self) -> Option<AccountKind> {
        AccountKind::from_code(self.kind)
    }
}

impl Object for Account {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![("kind", self.kind.into())]
    }
}

pub type AccountEvent = Event<Account>;

/// Direct role grant to an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AccountRole {
    pub id: i64,
    pub account_id: i64,
    pub role_id: i64,
}

impl Object for AccountRole {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![
            ("account_id", self.account_id.into()),
            ("role_id", self.role_id.into()),
        ]
    }
}

pub type AccountRoleEvent = Event<AccountRole>;

/// Authenticated login session. Times are Unix seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub account_id: i64,
    pub secret: String,
    pub create_time: i64,
    pub expire_time: i64,
    pub remote_addr: String,
    pub user_agent: String,
}

impl Session {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expire_time <= now.unix_timestamp()
    }
}

impl Object for Session {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![
            ("account_id", self.account_id.into()),
            ("secret", self.secret.clone().into()),
            ("create_time", self.create_time.into()),
            ("expire_time", self.expire_time.into()),
            ("remote_addr", self.remote_addr.clone().into()),
            ("user_agent", self.user_agent.clone().into()),
        ]
    }
}

pub type SessionEvent = Event<Session>;

/// Login credentials and profile attached to an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub account_id: i64,
    pub login: String,
    pub password_hash: String,
    pub password_salt: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
}

impl Object for User {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![
            ("account_id", self.account_id.into()),
            ("login", self.login.clone().into()),
            ("password_hash", self.password_hash.clone().into()),
            ("password_salt", self.password_salt.clone().into()),
            ("email", self.email.clone().into()),
            ("first_name", self.first_name.clone().into()),
            ("last_name", self.last_name.clone().into()),
            ("middle_name", self.middle_name.clone().into()),
        ]
    }
}

pub type UserEvent = Event<User>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Quiz {
    pub id: i64,
}

impl Object for Quiz {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        Vec::new()
    }
}

pub type QuizEvent = Event<Quiz>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Pool {
    pub id: i64,
}

impl Object for Pool {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        Vec::new()
    }
}

pub type PoolEvent = Event<Pool>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Problem {
    pub id: i64,
}

impl Object for Problem {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        Vec::new()
    }
}

pub type ProblemEvent = Event<Problem>;

/// One served request. Visits are only ever appended and have no event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Visit {
    pub id: i64,
    /// Unix seconds.
    pub time: i64,
    pub account_id: Option<i64>,
    pub session_id: Option<i64>,
    pub host: String,
    pub protocol: String,
    pub method: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub path: String,
    pub real_ip: String,
    pub status: i64,
}

impl Object for Visit {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn columns(&self) -> Vec<(&'static str, Column)> {
        vec![
            ("time", self.time.into()),
            ("account_id", self.account_id.into()),
            ("session_id", self.session_id.into()),
            ("host", self.host.clone().into()),
            ("protocol", self.protocol.clone().into()),
            ("method", self.method.clone().into()),
            ("remote_addr", self.remote_addr.clone().into()),
            ("user_agent", self.user_agent.clone().into()),
            ("path", self.path.clone().into()),
            ("real_ip", self.real_ip.clone().into()),
            ("status", self.status.into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn session_expires_at_expire_time() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let session = Session {
            expire_time: now.unix_timestamp(),
            ..Session::default()
        };
        assert!(session.is_expired(now));
        assert!(!session.is_expired(now - time::Duration::seconds(1)));
    }

    #[test]
    fn delete_snapshot_carries_only_identity() {
        let user = User::with_id(17);
        assert_eq!(user.id, 17);
        assert!(user.login.is_empty());
        assert_eq!(user.email, None);
    }

    #[test]
    fn nullable_columns_bind_as_null() {
        let user = User {
            login: "alice".to_string(),
            ..User::default()
        };
        let columns = user.columns();
        assert_eq!(columns.len(), 8);
        assert!(columns.contains(&("email", Column::Text(None))));
        assert!(columns.contains(&("login", Column::Text(Some("alice".to_string())))));
    }

    #[test]
    fn account_kind_codes() {
        let account = Account { id: 1, kind: 1 };
        assert_eq!(account.account_kind(), Some(AccountKind::User));
        assert_eq!(AccountKind::User.code(), 1);
        assert_eq!(Account { id: 2, kind: 9 }.account_kind(), None);
    }
}
