//! Store engine configuration.

use serde::Deserialize;

/// How far behind the newest event a freshly initialized consumer starts.
pub const DEFAULT_RECOVERY_WINDOW: i64 = 25_000;
/// Maximum number of events fetched by a single sync round trip.
pub const DEFAULT_SYNC_BATCH_LIMIT: usize = 1000;

/// Tuning shared by every store built on [`super::CacheStore`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of trailing events re-read on init so late commits with
    /// smaller ids are not missed.
    pub recovery_window: i64,
    /// Events requested per batch while syncing.
    pub sync_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            sync_batch_limit: DEFAULT_SYNC_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::StoreSettings> for CacheConfig {
    fn from(settings: &crate::config::StoreSettings) -> Self {
        Self {
            recovery_window: settings.recovery_window,
            sync_batch_limit: settings.sync_batch_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Batch limit clamped to at least one event.
    pub fn batch_limit(&self) -> usize {
        self.sync_batch_limit.max(1)
    }

    /// Recovery window clamped to be non-negative.
    pub fn window(&self) -> i64 {
        self.recovery_window.max(0)
    }
}
