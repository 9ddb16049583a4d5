//! Event-sourced cache stores.
//!
//! Every entity type lives in a relational object table paired with an
//! append-only event table. A store serves reads from an in-memory snapshot
//! of the object table:
//!
//! - **Init** bulk-loads the object table and places the event cursor a
//!   bounded window behind the newest event.
//! - **Sync** replays events from the cursor onward into the snapshot.
//! - **Create / Update / Delete** write the row and its event in one
//!   transaction; the snapshot picks the change up on the next sync.

mod config;
mod consumer;
mod context;
mod error;
mod events;
mod index;
mod lock;
mod object;
mod persist;
mod store;

pub use config::{CacheConfig, DEFAULT_RECOVERY_WINDOW, DEFAULT_SYNC_BATCH_LIMIT};
pub use consumer::{EventConsumer, recovery_begin_id};
pub use context::{current_account_id, in_write_tx, with_account_id, within_write_tx};
pub use error::StoreError;
pub use events::{BaseEvent, Event, EventKind, ObjectEvent, UnknownEventKind};
pub use index::Index;
pub use object::{Column, Object};
pub use persist::{Database, EventTable, ObjectTable, TxMode};
pub use store::{CacheStore, InitStats, Snapshot, Store, StoreIndexes};

pub(crate) use lock::mutex_lock;
