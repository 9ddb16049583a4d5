//! Embedded in-memory engine.
//!
//! Rows are kept as JSON documents keyed by id. Read-only transactions
//! share the last committed state and never wait for writers; a writer holds
//! the single writer lock and works on a private copy that replaces the
//! committed state on commit.
//! Id sequences live outside transactions, so a rolled back insert leaves a
//! gap exactly like a database sequence does.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::cache::{
    Database, EventTable, Object, ObjectEvent, ObjectTable, StoreError, TxMode, mutex_lock,
};

const SOURCE: &str = "infra::db::memory";

type Rows = BTreeMap<i64, Value>;

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<String, Rows>,
}

impl Tables {
    fn rows(&self, table: &str) -> Option<&Rows> {
        self.rows.get(table)
    }
}

#[derive(Default)]
struct Shared {
    committed: StdMutex<Arc<Tables>>,
    writer: Arc<Mutex<()>>,
    sequences: StdMutex<HashMap<String, i64>>,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

enum TxState {
    Read(Arc<Tables>),
    Write {
        tables: Tables,
        writer: OwnedMutexGuard<()>,
    },
}

pub struct MemoryTx {
    state: TxState,
}

impl MemoryTx {
    fn tables(&self) -> &Tables {
        match &self.state {
            TxState::Read(tables) => tables.as_ref(),
            TxState::Write { tables, .. } => tables,
        }
    }

    fn rows(&self, table: &str) -> Option<&Rows> {
        self.tables().rows(table)
    }

    fn rows_mut(&mut self, table: &str) -> Result<&mut Rows, StoreError> {
        match &mut self.state {
            TxState::Read(_) => Err(StoreError::ReadOnly),
            TxState::Write { tables, .. } => {
                Ok(tables.rows.entry(table.to_string()).or_default())
            }
        }
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn committed(&self, op: &'static str) -> Arc<Tables> {
        Arc::clone(&*mutex_lock(&self.shared.committed, SOURCE, op))
    }

    fn next_id(&self, sequence: &str) -> i64 {
        let mut sequences = mutex_lock(&self.shared.sequences, SOURCE, "next_id");
        let value = sequences.entry(sequence.to_string()).or_insert(0);
        *value += 1;
        *value
    }

    /// Number of committed rows in `table`.
    pub async fn row_count(&self, table: &str) -> usize {
        self.committed("row_count")
            .rows(table)
            .map_or(0, Rows::len)
    }

    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, table: &str, id: i64, value: Value) {
        let _writer = self.shared.writer.lock().await;
        let mut committed = mutex_lock(&self.shared.committed, SOURCE, "insert_raw");
        let mut tables = (**committed).clone();
        tables.rows.entry(table.to_string()).or_default().insert(id, value);
        *committed = Arc::new(tables);
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: &Value) -> Result<T, StoreError> {
    serde_json::from_value(row.clone()).map_err(StoreError::decode)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(StoreError::decode)
}

#[async_trait]
impl Database for MemoryDatabase {
    type Tx = MemoryTx;

    async fn begin(&self, mode: TxMode) -> Result<MemoryTx, StoreError> {
        let state = match mode {
            TxMode::ReadOnly => TxState::Read(self.committed("begin")),
            TxMode::ReadWrite => {
                let writer = Arc::clone(&self.shared.writer).lock_owned().await;
                let tables = (*self.committed("begin")).clone();
                TxState::Write { tables, writer }
            }
        };
        Ok(MemoryTx { state })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), StoreError> {
        if let TxState::Write { tables, writer } = tx.state {
            *mutex_lock(&self.shared.committed, SOURCE, "commit") = Arc::new(tables);
            drop(writer);
        }
        Ok(())
    }

    fn object_table<T: Object>(&self, table: &str) -> Arc<dyn ObjectTable<T, Tx = MemoryTx>> {
        Arc::new(MemoryObjectTable {
            db: self.clone(),
            name: table.to_string(),
            _object: PhantomData,
        })
    }

    fn event_table<E: ObjectEvent>(&self, table: &str) -> Arc<dyn EventTable<E, Tx = MemoryTx>> {
        Arc::new(MemoryEventTable {
            db: self.clone(),
            name: table.to_string(),
            _event: PhantomData,
        })
    }
}

struct MemoryObjectTable<T> {
    db: MemoryDatabase,
    name: String,
    _object: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Object> ObjectTable<T> for MemoryObjectTable<T> {
    type Tx = MemoryTx;

    fn table(&self) -> &str {
        &self.name
    }

    async fn load_objects(&self, tx: &mut MemoryTx) -> Result<Vec<T>, StoreError> {
        tx.rows(&self.name)
            .into_iter()
            .flat_map(|rows| rows.values())
            .map(decode)
            .collect()
    }

    async fn create_object(&self, tx: &mut MemoryTx, object: &mut T) -> Result<(), StoreError> {
        let rows = tx.rows_mut(&self.name)?;
        object.set_id(self.db.next_id(&self.name));
        rows.insert(object.id(), encode(&*object)?);
        Ok(())
    }

    async fn update_object(&self, tx: &mut MemoryTx, object: &T) -> Result<(), StoreError> {
        let rows = tx.rows_mut(&self.name)?;
        let row = rows.get_mut(&object.id()).ok_or(StoreError::NotFound)?;
        *row = encode(object)?;
        Ok(())
    }

    async fn delete_object(&self, tx: &mut MemoryTx, id: i64) -> Result<(), StoreError> {
        let rows = tx.rows_mut(&self.name)?;
        rows.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

struct MemoryEventTable<E> {
    db: MemoryDatabase,
    name: String,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E: ObjectEvent> EventTable<E> for MemoryEventTable<E> {
    type Tx = MemoryTx;

    fn table(&self) -> &str {
        &self.name
    }

    async fn last_event_id(&self, tx: &mut MemoryTx) -> Result<Option<i64>, StoreError> {
        Ok(tx
            .rows(&self.name)
            .and_then(|rows| rows.keys().next_back().copied()))
    }

    async fn lock(&self, tx: &mut MemoryTx) -> Result<(), StoreError> {
        // Writers already hold the engine-wide writer lock.
        tx.rows_mut(&self.name).map(|_| ())
    }

    async fn create_event(&self, tx: &mut MemoryTx, event: &mut E) -> Result<(), StoreError> {
        let rows = tx.rows_mut(&self.name)?;
        event.set_event_id(self.db.next_id(&self.name));
        rows.insert(event.event_id(), encode(&*event)?);
        Ok(())
    }

    async fn load_events(
        &self,
        tx: &mut MemoryTx,
        begin_id: i64,
        limit: usize,
    ) -> Result<Vec<E>, StoreError> {
        tx.rows(&self.name)
            .into_iter()
            .flat_map(|rows| rows.range(begin_id..).map(|(_, row)| row))
            .take(limit)
            .map(decode)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Role;

    fn role(name: &str) -> Role {
        Role {
            id: 0,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn rolled_back_insert_leaves_id_gap() {
        let db = MemoryDatabase::new();
        let roles = db.object_table::<Role>("role");

        let mut tx = db.begin(TxMode::ReadWrite).await.unwrap();
        let mut aborted = role("aborted");
        roles.create_object(&mut tx, &mut aborted).await.unwrap();
        assert_eq!(aborted.id, 1);
        drop(tx);

        let mut tx = db.begin(TxMode::ReadWrite).await.unwrap();
        let mut kept = role("kept");
        roles.create_object(&mut tx, &mut kept).await.unwrap();
        db.commit(tx).await.unwrap();
        assert_eq!(kept.id, 2);

        let mut tx = db.begin(TxMode::ReadOnly).await.unwrap();
        let loaded = roles.load_objects(&mut tx).await.unwrap();
        assert_eq!(loaded, vec![Role { id: 2, name: "kept".to_string() }]);
    }

    #[tokio::test]
    async fn read_only_transaction_rejects_writes() {
        let db = MemoryDatabase::new();
        let roles = db.object_table::<Role>("role");
        let mut tx = db.begin(TxMode::ReadOnly).await.unwrap();

        let mut object = role("nope");
        assert!(matches!(
            roles.create_object(&mut tx, &mut object).await,
            Err(StoreError::ReadOnly)
        ));
        assert_eq!(object.id, 0);
    }

    #[tokio::test]
    async fn reader_keeps_its_snapshot() {
        let db = MemoryDatabase::new();
        let roles = db.object_table::<Role>("role");
        let mut reader = db.begin(TxMode::ReadOnly).await.unwrap();

        let mut tx = db.begin(TxMode::ReadWrite).await.unwrap();
        roles.create_object(&mut tx, &mut role("late")).await.unwrap();
        db.commit(tx).await.unwrap();

        assert!(roles.load_objects(&mut reader).await.unwrap().is_empty());
        assert_eq!(db.row_count("role").await, 1);
    }

    #[tokio::test]
    async fn reader_does_not_wait_for_open_writer() {
        let db = MemoryDatabase::new();
        let roles = db.object_table::<Role>("role");

        let mut writer = db.begin(TxMode::ReadWrite).await.unwrap();
        roles.create_object(&mut writer, &mut role("pending")).await.unwrap();

        let mut reader = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            db.begin(TxMode::ReadOnly),
        )
        .await
        .expect("reader blocked by writer")
        .unwrap();
        assert!(roles.load_objects(&mut reader).await.unwrap().is_empty());

        db.commit(writer).await.unwrap();
        assert_eq!(db.row_count("role").await, 1);
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_row_fail() {
        let db = MemoryDatabase::new();
        let roles = db.object_table::<Role>("role");
        let mut tx = db.begin(TxMode::ReadWrite).await.unwrap();

        let missing = Role {
            id: 9,
            name: "ghost".to_string(),
        };
        assert!(matches!(
            roles.update_object(&mut tx, &missing).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            roles.delete_object(&mut tx, 9).await,
            Err(StoreError::NotFound)
        ));
    }
}
