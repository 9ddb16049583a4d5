//! Change events.
//!
//! Every write appends one event to the event table paired with the object
//! table. An event is the full post-change object plus a small header with
//! the event id, kind, time and acting account.

use std::fmt::{self, Debug};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use thiserror::Error;
use time::OffsetDateTime;

use super::object::Object;

/// Kind of change recorded by an event. The numeric values are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum EventKind {
    Create = 1,
    Delete = 2,
    Update = 3,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown event kind {0}")]
pub struct UnknownEventKind(pub i16);

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventKind> for i16 {
    fn from(kind: EventKind) -> Self {
        kind as i16
    }
}

impl TryFrom<i16> for EventKind {
    type Error = UnknownEventKind;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Create),
            2 => Ok(Self::Delete),
            3 => Ok(Self::Update),
            other => Err(UnknownEventKind(other)),
        }
    }
}

/// Header shared by all events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEvent {
    /// Assigned by the database on insert; zero until then.
    pub event_id: i64,
    pub event_kind: EventKind,
    /// Seconds since the Unix epoch, taken when the event is constructed.
    pub event_time: i64,
    pub event_account_id: Option<i64>,
}

impl BaseEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            event_id: 0,
            event_kind: kind,
            event_time: OffsetDateTime::now_utc().unix_timestamp(),
            event_account_id: None,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for BaseEvent {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let raw_kind: i16 = row.try_get("event_kind")?;
        let event_kind =
            EventKind::try_from(raw_kind).map_err(|err| sqlx::Error::ColumnDecode {
                index: "event_kind".to_string(),
                source: Box::new(err),
            })?;
        Ok(Self {
            event_id: row.try_get("event_id")?,
            event_kind,
            event_time: row.try_get("event_time")?,
            event_account_id: row.try_get("event_account_id")?,
        })
    }
}

/// An event carrying one object of type [`ObjectEvent::Object`].
pub trait ObjectEvent:
    Clone
    + Debug
    + Send
    + Sync
    + Unpin
    + Serialize
    + DeserializeOwned
    + for<'r> FromRow<'r, PgRow>
    + 'static
{
    type Object: Object;

    fn new(kind: EventKind, object: Self::Object) -> Self;

    fn base(&self) -> &BaseEvent;

    fn base_mut(&mut self) -> &mut BaseEvent;

    fn object(&self) -> &Self::Object;

    fn set_object(&mut self, object: Self::Object);

    fn event_id(&self) -> i64 {
        self.base().event_id
    }

    fn set_event_id(&mut self, event_id: i64) {
        self.base_mut().event_id = event_id;
    }

    fn event_kind(&self) -> EventKind {
        self.base().event_kind
    }

    fn event_time(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.base().event_time)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    fn event_account_id(&self) -> Option<i64> {
        self.base().event_account_id
    }

    fn set_account_id(&mut self, account_id: Option<i64>) {
        self.base_mut().event_account_id = account_id;
    }
}

/// Event wrapper usable for any [`Object`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    pub base: BaseEvent,
    pub object: T,
}

impl<'r, T: Object> FromRow<'r, PgRow> for Event<T> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            base: BaseEvent::from_row(row)?,
            object: T::from_row(row)?,
        })
    }
}

impl<T: Object> ObjectEvent for Event<T> {
    type Object = T;

    fn new(kind: EventKind, object: T) -> Self {
        Self {
            base: BaseEvent::new(kind),
            object,
        }
    }

    fn base(&self) -> &BaseEvent {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseEvent {
        &mut self.base
    }

    fn object(&self) -> &T {
        &self.object
    }

    fn set_object(&mut self, object: T) {
        self.object = object;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_persisted_codes() {
        for kind in [EventKind::Create, EventKind::Delete, EventKind::Update] {
            assert_eq!(EventKind::try_from(i16::from(kind)), Ok(kind));
        }
        assert_eq!(i16::from(EventKind::Create), 1);
        assert_eq!(i16::from(EventKind::Delete), 2);
        assert_eq!(i16::from(EventKind::Update), 3);
        assert_eq!(EventKind::try_from(9), Err(UnknownEventKind(9)));
    }

    #[test]
    fn new_event_is_stamped_with_current_time() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let base = BaseEvent::new(EventKind::Update);
        let after = OffsetDateTime::now_utc().unix_timestamp();

        assert_eq!(base.event_id, 0);
        assert_eq!(base.event_account_id, None);
        assert!(base.event_time >= before && base.event_time <= after);
    }

    #[test]
    fn serialized_kind_is_numeric() {
        let base = BaseEvent {
            event_id: 3,
            event_kind: EventKind::Delete,
            event_time: 10,
            event_account_id: Some(5),
        };
        let value = serde_json::to_value(&base).unwrap();
        assert_eq!(value["event_kind"], 2);

        let decoded: BaseEvent = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, base);
    }

    #[test]
    fn unknown_kind_is_rejected_on_decode() {
        let value = serde_json::json!({
            "event_id": 1,
            "event_kind": 7,
            "event_time": 0,
            "event_account_id": null,
        });
        assert!(serde_json::from_value::<BaseEvent>(value).is_err());
    }
}
