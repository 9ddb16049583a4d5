//! Entity stores built on the cache engine.
//!
//! Each store pairs an entity with its secondary indices and adds lookup
//! helpers on top of [`crate::cache::CacheStore`]. Lookups read the
//! snapshot and never hit the database. [`VisitStore`] is the exception: a
//! plain write-through table with no snapshot.

mod accounts;
mod quizzes;
mod roles;
mod sessions;
mod settings;
mod users;
mod visits;

pub use accounts::{AccountIndexes, AccountRoleIndexes, AccountRoleStore, AccountStore};
pub use quizzes::{PoolIndexes, PoolStore, ProblemIndexes, ProblemStore, QuizIndexes, QuizStore};
pub use roles::{RoleEdgeIndexes, RoleEdgeStore, RoleIndexes, RoleStore};
pub use sessions::{SessionIndexes, SessionStore};
pub use settings::{SettingIndexes, SettingStore};
pub use users::{PasswordError, UserIndexes, UserStore};
pub use visits::VisitStore;
