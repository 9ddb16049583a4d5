//! Persistence backends for the store engine.

mod memory;
mod tables;
mod util;

pub use memory::{MemoryDatabase, MemoryTx};
pub use tables::{PgEventTable, PgObjectTable};
pub use util::{map_sqlx_error, quote_ident};

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::cache::{Database, EventTable, Object, ObjectEvent, ObjectTable, StoreError, TxMode};

#[derive(Clone)]
pub struct PgDatabase {
    pool: Arc<PgPool>,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

#[async_trait]
impl Database for PgDatabase {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self, mode: TxMode) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let isolation = match mode {
            TxMode::ReadOnly => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY",
            TxMode::ReadWrite => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
        };
        query(isolation)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await.map_err(map_sqlx_error)
    }

    fn object_table<T: Object>(&self, table: &str) -> Arc<dyn ObjectTable<T, Tx = Self::Tx>> {
        Arc::new(PgObjectTable::new(table))
    }

    fn event_table<E: ObjectEvent>(&self, table: &str) -> Arc<dyn EventTable<E, Tx = Self::Tx>> {
        Arc::new(PgEventTable::new(table))
    }
}
