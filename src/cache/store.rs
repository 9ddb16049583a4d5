//! Generic event-sourced store.
//!
//! [`CacheStore`] keeps every row of one object table in memory. Readers
//! only ever see the snapshot; writers go to the database and their change
//! becomes visible after the next [`Store::sync`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, gauge, histogram};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::config::CacheConfig;
use super::consumer::{EventConsumer, recovery_begin_id};
use super::context::{current_account_id, in_write_tx};
use super::error::StoreError;
use super::events::{EventKind, ObjectEvent};
use super::lock::{rw_read, rw_write};
use super::object::Object;
use super::persist::{Database, EventTable, ObjectTable, TxMode};

/// Entity-specific part of a store: its types, name and secondary indices.
///
/// `index` is called for every object entering the snapshot and `unindex`
/// for every object leaving it, always with the exact value that was
/// indexed before.
pub trait StoreIndexes: Default + Send + Sync + 'static {
    type Object: Object;
    type Event: ObjectEvent<Object = Self::Object>;

    /// Label used in logs and metrics.
    const NAME: &'static str;

    fn index(&mut self, object: &Self::Object);

    fn unindex(&mut self, object: &Self::Object);
}

/// In-memory image of an object table plus its indices.
pub struct Snapshot<S: StoreIndexes> {
    objects: HashMap<i64, S::Object>,
    indexes: S,
}

impl<S: StoreIndexes> Default for Snapshot<S> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            indexes: S::default(),
        }
    }
}

impl<S: StoreIndexes> Snapshot<S> {
    pub fn get(&self, id: i64) -> Option<&S::Object> {
        self.objects.get(&id)
    }

    pub fn indexes(&self) -> &S {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects, ascending by id.
    pub fn objects(&self) -> Vec<&S::Object> {
        let mut objects: Vec<&S::Object> = self.objects.values().collect();
        objects.sort_unstable_by_key(|object| object.id());
        objects
    }

    /// Objects for `ids`, skipping ids that are not present.
    pub fn select(&self, ids: impl IntoIterator<Item = i64>) -> Vec<S::Object> {
        ids.into_iter()
            .filter_map(|id| self.objects.get(&id).cloned())
            .collect()
    }

    /// Applies one event. Applying the same event twice leaves the snapshot
    /// as if it was applied once.
    pub fn apply(&mut self, event: &S::Event) {
        match event.event_kind() {
            EventKind::Create => self.create(event.object().clone()),
            EventKind::Update => self.update(event.object().clone()),
            EventKind::Delete => self.delete(event.object().id()),
        }
    }

    fn create(&mut self, object: S::Object) {
        if let Some(previous) = self.objects.remove(&object.id()) {
            self.indexes.unindex(&previous);
        }
        self.indexes.index(&object);
        self.objects.insert(object.id(), object);
    }

    fn update(&mut self, object: S::Object) {
        match self.objects.get_mut(&object.id()) {
            Some(current) => {
                self.indexes.unindex(current);
                self.indexes.index(&object);
                *current = object;
            }
            None => self.create(object),
        }
    }

    fn delete(&mut self, id: i64) {
        if let Some(previous) = self.objects.remove(&id) {
            self.indexes.unindex(&previous);
        }
    }
}

/// Lifecycle shared by every store, independent of its entity type.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rebuilds the snapshot from the object table and positions the event
    /// cursor near the end of the event table.
    async fn init(&self) -> Result<(), StoreError>;

    /// Applies events committed since the last sync. Returns how many were
    /// applied. On failure the snapshot and cursor keep their previous state
    /// for the events that were not applied.
    async fn sync(&self) -> Result<usize, StoreError>;
}

/// Outcome of the most recent [`Store::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStats {
    /// Event id the cursor started from, one recovery window behind the tail.
    pub recovery_begin_id: i64,
    /// Events inside the window that the cursor moved past.
    pub skipped_events: usize,
    pub objects: usize,
}

pub struct CacheStore<S: StoreIndexes, D: Database> {
    db: D,
    objects: Arc<dyn ObjectTable<S::Object, Tx = D::Tx>>,
    events: Arc<dyn EventTable<S::Event, Tx = D::Tx>>,
    config: CacheConfig,
    consumer: Mutex<Option<EventConsumer<S::Event, D::Tx>>>,
    snapshot: RwLock<Snapshot<S>>,
    last_init: RwLock<Option<InitStats>>,
}

impl<S: StoreIndexes, D: Database> CacheStore<S, D> {
    pub fn new(db: D, table: &str, event_table: &str, config: CacheConfig) -> Self {
        let objects = db.object_table::<S::Object>(table);
        let events = db.event_table::<S::Event>(event_table);
        Self {
            db,
            objects,
            events,
            config,
            consumer: Mutex::new(None),
            snapshot: RwLock::new(Snapshot::default()),
            last_init: RwLock::new(None),
        }
    }

    pub fn table(&self) -> &str {
        self.objects.table()
    }

    pub fn event_table(&self) -> &str {
        self.events.table()
    }

    /// Copy of the cached object with `id`.
    pub fn get(&self, id: i64) -> Option<S::Object> {
        rw_read(&self.snapshot, S::NAME, "get").get(id).cloned()
    }

    /// Copies of all cached objects, ascending by id.
    pub fn all(&self) -> Vec<S::Object> {
        rw_read(&self.snapshot, S::NAME, "all")
            .objects()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.snapshot, S::NAME, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` against the snapshot under the shared lock. Keep `f` short;
    /// sync waits for it.
    pub fn read<R>(&self, f: impl FnOnce(&Snapshot<S>) -> R) -> R {
        f(&rw_read(&self.snapshot, S::NAME, "read"))
    }

    pub fn last_init(&self) -> Option<InitStats> {
        *rw_read(&self.last_init, S::NAME, "last_init")
    }

    /// Smallest event id not applied yet, `None` before init.
    pub async fn begin_id(&self) -> Option<i64> {
        self.consumer.lock().await.as_ref().map(EventConsumer::begin_id)
    }

    /// Creates `object` in its own transaction and returns it with the
    /// generated id.
    pub async fn create(&self, object: S::Object) -> Result<S::Object, StoreError> {
        let mut tx = self.begin_write().await?;
        let object = self.create_in(&mut tx, object).await?;
        self.db.commit(tx).await?;
        Ok(object)
    }

    pub async fn create_in(
        &self,
        tx: &mut D::Tx,
        object: S::Object,
    ) -> Result<S::Object, StoreError> {
        let mut event = S::Event::new(EventKind::Create, object);
        self.write_event(tx, &mut event).await?;
        Ok(event.object().clone())
    }

    pub async fn update(&self, object: S::Object) -> Result<(), StoreError> {
        let mut tx = self.begin_write().await?;
        self.update_in(&mut tx, object).await?;
        self.db.commit(tx).await
    }

    pub async fn update_in(&self, tx: &mut D::Tx, object: S::Object) -> Result<(), StoreError> {
        let mut event = S::Event::new(EventKind::Update, object);
        self.write_event(tx, &mut event).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.begin_write().await?;
        self.delete_in(&mut tx, id).await?;
        self.db.commit(tx).await
    }

    pub async fn delete_in(&self, tx: &mut D::Tx, id: i64) -> Result<(), StoreError> {
        let mut event = S::Event::new(EventKind::Delete, S::Object::with_id(id));
        self.write_event(tx, &mut event).await
    }

    /// Opens the transaction of a standalone write. Inside a caller-owned
    /// transaction the caller must pass it to the `_in` variant instead.
    async fn begin_write(&self) -> Result<D::Tx, StoreError> {
        if in_write_tx() {
            return Err(StoreError::NestedTransaction);
        }
        self.db.begin(TxMode::ReadWrite).await
    }

    async fn write_event(&self, tx: &mut D::Tx, event: &mut S::Event) -> Result<(), StoreError> {
        event.set_account_id(current_account_id());
        self.events.lock(tx).await?;
        match event.event_kind() {
            EventKind::Create => {
                let mut object = event.object().clone();
                self.objects.create_object(tx, &mut object).await?;
                event.set_object(object);
            }
            EventKind::Update => self.objects.update_object(tx, event.object()).await?,
            EventKind::Delete => {
                self.objects
                    .delete_object(tx, event.object().id())
                    .await?
            }
        }
        self.events.create_event(tx, event).await?;
        debug!(
            store = S::NAME,
            event_id = event.event_id(),
            kind = %event.event_kind(),
            object_id = event.object().id(),
            account_id = ?event.event_account_id(),
            "Recorded store event"
        );
        Ok(())
    }

    fn record_size(&self, len: usize) {
        gauge!("quizstore_store_objects", "store" => S::NAME).set(len as f64);
    }
}

#[async_trait]
impl<S: StoreIndexes, D: Database> Store for CacheStore<S, D> {
    fn name(&self) -> &'static str {
        S::NAME
    }

    #[instrument(skip(self), fields(store = S::NAME))]
    async fn init(&self) -> Result<(), StoreError> {
        let mut slot = self.consumer.lock().await;

        let mut tx = self.db.begin(TxMode::ReadOnly).await?;
        let last_event_id = self.events.last_event_id(&mut tx).await?;
        let begin_id = recovery_begin_id(last_event_id, self.config.window());
        let mut consumer =
            EventConsumer::new(Arc::clone(&self.events), begin_id, self.config.batch_limit());
        // Events in the window are already reflected by the rows loaded
        // below; only the cursor has to move past them.
        let skipped = consumer.consume_events(&mut tx, |_| {}).await?;
        let objects = self.objects.load_objects(&mut tx).await?;
        self.db.commit(tx).await?;

        let mut snapshot = Snapshot::<S>::default();
        for object in objects {
            snapshot.create(object);
        }
        let len = snapshot.len();
        *rw_write(&self.snapshot, S::NAME, "init") = snapshot;
        let cursor = consumer.begin_id();
        *slot = Some(consumer);
        *rw_write(&self.last_init, S::NAME, "init") = Some(InitStats {
            recovery_begin_id: begin_id,
            skipped_events: skipped,
            objects: len,
        });

        self.record_size(len);
        info!(
            store = S::NAME,
            table = self.table(),
            event_table = self.event_table(),
            objects = len,
            recovery_begin_id = begin_id,
            skipped_events = skipped,
            begin_id = cursor,
            "Store initialized"
        );
        Ok(())
    }

    async fn sync(&self) -> Result<usize, StoreError> {
        let started = Instant::now();
        let mut slot = self.consumer.lock().await;
        let consumer = slot.as_mut().ok_or(StoreError::NotInitialized(S::NAME))?;

        let mut tx = self.db.begin(TxMode::ReadOnly).await?;
        let mut applied = 0;
        loop {
            let batch = consumer.load_batch(&mut tx).await?;
            let fetched = batch.len();
            let start = consumer.begin_id();
            {
                let mut snapshot = rw_write(&self.snapshot, S::NAME, "sync");
                for event in &batch {
                    if consumer.accept(event) {
                        snapshot.apply(event);
                        applied += 1;
                    }
                }
            }
            if fetched < consumer.batch_limit() || consumer.begin_id() == start {
                break;
            }
        }
        self.db.commit(tx).await?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("quizstore_store_sync_ms", "store" => S::NAME).record(elapsed_ms);
        if applied > 0 {
            counter!("quizstore_store_events_applied_total", "store" => S::NAME)
                .increment(applied as u64);
            let len = self.len();
            self.record_size(len);
            debug!(
                store = S::NAME,
                event_table = self.event_table(),
                applied,
                objects = len,
                begin_id = consumer.begin_id(),
                elapsed_ms,
                "Store synced"
            );
        }
        Ok(applied)
    }
}
