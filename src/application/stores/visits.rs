use std::sync::Arc;

use tracing::debug;

use crate::cache::{Database, ObjectTable, StoreError, TxMode, in_write_tx};
use crate::domain::entities::Visit;

/// Append-only request log. Unlike the cached stores it keeps nothing in
/// memory and writes no events.
pub struct VisitStore<D: Database> {
    db: D,
    visits: Arc<dyn ObjectTable<Visit, Tx = D::Tx>>,
}

impl<D: Database> VisitStore<D> {
    pub fn new(db: D, table: &str) -> Self {
        let visits = db.object_table::<Visit>(table);
        Self { db, visits }
    }

    /// Records `visit` in its own transaction and returns it with the
    /// generated id.
    pub async fn create(&self, visit: Visit) -> Result<Visit, StoreError> {
        if in_write_tx() {
            return Err(StoreError::NestedTransaction);
        }
        let mut tx = self.db.begin(TxMode::ReadWrite).await?;
        let visit = self.create_in(&mut tx, visit).await?;
        self.db.commit(tx).await?;
        Ok(visit)
    }

    pub async fn create_in(&self, tx: &mut D::Tx, mut visit: Visit) -> Result<Visit, StoreError> {
        self.visits.create_object(tx, &mut visit).await?;
        debug!(
            table = self.visits.table(),
            visit_id = visit.id,
            status = visit.status,
            "Recorded visit"
        );
        Ok(visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::db::MemoryDatabase;

    fn visit(path: &str, status: i64) -> Visit {
        Visit {
            time: 1_700_000_000,
            account_id: Some(4),
            method: "GET".to_string(),
            path: path.to_string(),
            status,
            ..Visit::default()
        }
    }

    #[tokio::test]
    async fn visits_are_appended_without_events() {
        let db = MemoryDatabase::new();
        let visits = VisitStore::new(db.clone(), "visit");

        let first = visits.create(visit("/", 200)).await.unwrap();
        let second = visits.create(visit("/missing", 404)).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(second.path, "/missing");

        assert_eq!(db.row_count("visit").await, 2);
        assert_eq!(db.row_count("visit_event").await, 0);

        let table = db.object_table::<Visit>("visit");
        let mut tx = db.begin(TxMode::ReadOnly).await.unwrap();
        let stored = table.load_objects(&mut tx).await.unwrap();
        assert_eq!(stored, vec![first, second]);
    }
}
