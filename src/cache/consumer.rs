use std::sync::Arc;

use super::error::StoreError;
use super::events::ObjectEvent;
use super::persist::EventTable;

/// First event id a fresh consumer reads given the newest id in the table.
///
/// Event ids are handed out before commit, so a transaction can commit an
/// id smaller than one already visible. Starting `window` ids back lets the
/// first syncs pick up such late commits.
pub fn recovery_begin_id(last_event_id: Option<i64>, window: i64) -> i64 {
    match last_event_id {
        Some(last) if last > window => last - window,
        _ => 1,
    }
}

/// Cursor over an event table.
///
/// `begin_id` is the smallest event id not applied yet. It only moves
/// forward and only past events that were handed to the caller.
pub struct EventConsumer<E: ObjectEvent, Tx> {
    events: Arc<dyn EventTable<E, Tx = Tx>>,
    begin_id: i64,
    batch_limit: usize,
}

impl<E: ObjectEvent, Tx: Send + 'static> EventConsumer<E, Tx> {
    pub fn new(events: Arc<dyn EventTable<E, Tx = Tx>>, begin_id: i64, batch_limit: usize) -> Self {
        Self {
            events,
            begin_id: begin_id.max(1),
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn begin_id(&self) -> i64 {
        self.begin_id
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Next batch starting at the cursor. The cursor is not moved; call
    /// [`EventConsumer::accept`] for each event actually applied.
    pub async fn load_batch(&self, tx: &mut Tx) -> Result<Vec<E>, StoreError> {
        self.events
            .load_events(tx, self.begin_id, self.batch_limit)
            .await
    }

    /// Moves the cursor past `event`. Returns false for an event behind the
    /// cursor, which must then be skipped.
    pub fn accept(&mut self, event: &E) -> bool {
        let event_id = event.event_id();
        if event_id < self.begin_id {
            return false;
        }
        self.begin_id = event_id + 1;
        true
    }

    /// Drains every event from the cursor on, calling `apply` for each.
    /// Returns the number of events consumed.
    pub async fn consume_events<F>(&mut self, tx: &mut Tx, mut apply: F) -> Result<usize, StoreError>
    where
        F: FnMut(&E) + Send,
    {
        let mut consumed = 0;
        loop {
            let batch = self.load_batch(tx).await?;
            let fetched = batch.len();
            let start = self.begin_id;
            for event in &batch {
                if self.accept(event) {
                    apply(event);
                    consumed += 1;
                }
            }
            if fetched < self.batch_limit || self.begin_id == start {
                return Ok(consumed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_starts_at_one_within_window() {
        assert_eq!(recovery_begin_id(None, 25_000), 1);
        assert_eq!(recovery_begin_id(Some(0), 25_000), 1);
        assert_eq!(recovery_begin_id(Some(25_000), 25_000), 1);
    }

    #[test]
    fn recovery_steps_back_by_window() {
        assert_eq!(recovery_begin_id(Some(25_001), 25_000), 1);
        assert_eq!(recovery_begin_id(Some(30_000), 25_000), 5_000);
        assert_eq!(recovery_begin_id(Some(60), 10), 50);
    }

    #[test]
    fn zero_window_starts_at_last_event() {
        assert_eq!(recovery_begin_id(Some(12), 0), 12);
    }
}
