use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::FromRow;
use sqlx::postgres::PgRow;

/// Value bound to a single non-identity column on insert or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    SmallInt(Option<i16>),
    Int(Option<i64>),
    Text(Option<String>),
}

impl From<i16> for Column {
    fn from(value: i16) -> Self {
        Self::SmallInt(Some(value))
    }
}

impl From<i64> for Column {
    fn from(value: i64) -> Self {
        Self::Int(Some(value))
    }
}

impl From<Option<i64>> for Column {
    fn from(value: Option<i64>) -> Self {
        Self::Int(value)
    }
}

impl From<String> for Column {
    fn from(value: String) -> Self {
        Self::Text(Some(value))
    }
}

impl From<Option<String>> for Column {
    fn from(value: Option<String>) -> Self {
        Self::Text(value)
    }
}

/// A persisted entity with a database-generated `i64` identity.
///
/// The identity is the only column every object table shares; the remaining
/// columns are reported by [`Object::columns`] in table order and must match
/// the field names used for row decoding and serde.
pub trait Object:
    Clone
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + Unpin
    + Serialize
    + DeserializeOwned
    + for<'r> FromRow<'r, PgRow>
    + 'static
{
    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Default-valued object carrying only an identity, used for deletes.
    fn with_id(id: i64) -> Self {
        let mut object = Self::default();
        object.set_id(id);
        object
    }

    fn columns(&self) -> Vec<(&'static str, Column)>;
}
