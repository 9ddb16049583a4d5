use std::fmt::Display;

use thiserror::Error;

/// Failures surfaced by stores and their persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("failed to decode row: {0}")]
    Decode(String),
    #[error("object not found")]
    NotFound,
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("transaction is read-only")]
    ReadOnly,
    #[error("store `{0}` is not initialized")]
    NotInitialized(&'static str),
    #[error("write transaction opened inside an open one; use the `_in` variant")]
    NestedTransaction,
}

impl StoreError {
    pub fn database(err: impl Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn decode(err: impl Display) -> Self {
        Self::Decode(err.to_string())
    }

    /// Whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
