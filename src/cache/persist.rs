//! Persistence seams used by the store engine.
//!
//! A [`Database`] hands out transactions plus typed views over one object
//! table and one event table. Postgres and the embedded in-memory engine both
//! implement these traits in `infra::db`.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::StoreError;
use super::events::ObjectEvent;
use super::object::Object;

/// Isolation requested when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Repeatable-read snapshot that rejects writes. Used by init and sync.
    ReadOnly,
    /// Repeatable-read transaction used by create, update and delete.
    ReadWrite,
}

#[async_trait]
pub trait Database: Clone + Send + Sync + 'static {
    type Tx: Send + 'static;

    async fn begin(&self, mode: TxMode) -> Result<Self::Tx, StoreError>;

    /// Commits `tx`. Dropping a transaction without committing rolls it back.
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    fn object_table<T: Object>(&self, table: &str) -> Arc<dyn ObjectTable<T, Tx = Self::Tx>>;

    fn event_table<E: ObjectEvent>(&self, table: &str) -> Arc<dyn EventTable<E, Tx = Self::Tx>>;
}

/// Typed access to an object table.
#[async_trait]
pub trait ObjectTable<T: Object>: Send + Sync {
    type Tx: Send;

    fn table(&self) -> &str;

    /// Every row, ascending by id.
    async fn load_objects(&self, tx: &mut Self::Tx) -> Result<Vec<T>, StoreError>;

    /// Inserts `object` and writes the generated id back into it.
    async fn create_object(&self, tx: &mut Self::Tx, object: &mut T) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] if no row has `object.id()`.
    async fn update_object(&self, tx: &mut Self::Tx, object: &T) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] if no row has `id`.
    async fn delete_object(&self, tx: &mut Self::Tx, id: i64) -> Result<(), StoreError>;
}

/// Typed access to an append-only event table.
#[async_trait]
pub trait EventTable<E: ObjectEvent>: Send + Sync {
    type Tx: Send;

    fn table(&self) -> &str;

    /// Largest event id present, `None` for an empty table.
    async fn last_event_id(&self, tx: &mut Self::Tx) -> Result<Option<i64>, StoreError>;

    /// Serializes writers of this table until `tx` ends, so event ids are
    /// handed out in commit order.
    async fn lock(&self, tx: &mut Self::Tx) -> Result<(), StoreError>;

    /// Appends `event` and writes the generated event id back into it.
    async fn create_event(&self, tx: &mut Self::Tx, event: &mut E) -> Result<(), StoreError>;

    /// Up to `limit` events with `event_id >= begin_id`, ascending.
    async fn load_events(
        &self,
        tx: &mut Self::Tx,
        begin_id: i64,
        limit: usize,
    ) -> Result<Vec<E>, StoreError>;
}
