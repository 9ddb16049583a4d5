//! Postgres implementations of the object and event table seams.
//!
//! Statements are built at runtime from [`Object::columns`], so one
//! implementation serves every entity type.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Transaction};

use crate::cache::{Column, EventTable, Object, ObjectEvent, ObjectTable, StoreError};

use super::util::{map_sqlx_error, quote_ident};

type PgTx = Transaction<'static, Postgres>;

pub struct PgObjectTable<T> {
    name: String,
    quoted: String,
    _object: PhantomData<fn() -> T>,
}

impl<T> PgObjectTable<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            quoted: quote_ident(name),
            _object: PhantomData,
        }
    }
}

pub struct PgEventTable<E> {
    name: String,
    quoted: String,
    _event: PhantomData<fn() -> E>,
}

impl<E> PgEventTable<E> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            quoted: quote_ident(name),
            _event: PhantomData,
        }
    }
}

fn push_value<'qb, 'args: 'qb>(
    values: &mut Separated<'qb, 'args, Postgres, &'static str>,
    value: Column,
) {
    match value {
        Column::SmallInt(value) => {
            values.push_bind(value);
        }
        Column::Int(value) => {
            values.push_bind(value);
        }
        Column::Text(value) => {
            values.push_bind(value);
        }
    }
}

fn push_value_unseparated<'qb, 'args: 'qb>(
    values: &mut Separated<'qb, 'args, Postgres, &'static str>,
    value: Column,
) {
    match value {
        Column::SmallInt(value) => {
            values.push_bind_unseparated(value);
        }
        Column::Int(value) => {
            values.push_bind_unseparated(value);
        }
        Column::Text(value) => {
            values.push_bind_unseparated(value);
        }
    }
}

/// `INSERT INTO table (names...) VALUES (binds...)` without a trailing clause.
fn insert_statement(
    table: &str,
    columns: Vec<(&'static str, Column)>,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {table} "));
    if columns.is_empty() {
        qb.push("DEFAULT VALUES");
        return qb;
    }

    qb.push("(");
    {
        let mut names = qb.separated(", ");
        for (name, _) in &columns {
            names.push(*name);
        }
    }
    qb.push(") VALUES (");
    {
        let mut values = qb.separated(", ");
        for (_, value) in columns {
            push_value(&mut values, value);
        }
    }
    qb.push(")");
    qb
}

#[async_trait]
impl<T: Object> ObjectTable<T> for PgObjectTable<T> {
    type Tx = PgTx;

    fn table(&self) -> &str {
        &self.name
    }

    async fn load_objects(&self, tx: &mut PgTx) -> Result<Vec<T>, StoreError> {
        let sql = format!("SELECT * FROM {} ORDER BY id", self.quoted);
        sqlx::query_as::<_, T>(&sql)
            .fetch_all(&mut **tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn create_object(&self, tx: &mut PgTx, object: &mut T) -> Result<(), StoreError> {
        let mut qb = insert_statement(&self.quoted, object.columns());
        qb.push(" RETURNING id");
        let id: i64 = qb
            .build_query_scalar()
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        object.set_id(id);
        Ok(())
    }

    async fn update_object(&self, tx: &mut PgTx, object: &T) -> Result<(), StoreError> {
        let columns = object.columns();
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", self.quoted));
        if columns.is_empty() {
            qb.push("id = id");
        } else {
            let mut assignments = qb.separated(", ");
            for (name, value) in columns {
                assignments.push(format!("{name} = "));
                push_value_unseparated(&mut assignments, value);
            }
        }
        qb.push(" WHERE id = ");
        qb.push_bind(object.id());

        let result = qb
            .build()
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_object(&self, tx: &mut PgTx, id: i64) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.quoted);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl<E: ObjectEvent> EventTable<E> for PgEventTable<E> {
    type Tx = PgTx;

    fn table(&self) -> &str {
        &self.name
    }

    async fn last_event_id(&self, tx: &mut PgTx) -> Result<Option<i64>, StoreError> {
        let sql = format!("SELECT MAX(event_id) FROM {}", self.quoted);
        sqlx::query_scalar::<_, Option<i64>>(&sql)
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn lock(&self, tx: &mut PgTx) -> Result<(), StoreError> {
        let sql = format!("LOCK TABLE {} IN EXCLUSIVE MODE", self.quoted);
        sqlx::query(&sql)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn create_event(&self, tx: &mut PgTx, event: &mut E) -> Result<(), StoreError> {
        let base = event.base();
        let mut columns: Vec<(&'static str, Column)> = vec![
            ("event_kind", i16::from(base.event_kind).into()),
            ("event_time", base.event_time.into()),
            ("event_account_id", base.event_account_id.into()),
            ("id", event.object().id().into()),
        ];
        columns.extend(event.object().columns());

        let mut qb = insert_statement(&self.quoted, columns);
        qb.push(" RETURNING event_id");
        let event_id: i64 = qb
            .build_query_scalar()
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        event.set_event_id(event_id);
        Ok(())
    }

    async fn load_events(
        &self,
        tx: &mut PgTx,
        begin_id: i64,
        limit: usize,
    ) -> Result<Vec<E>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE event_id >= $1 ORDER BY event_id LIMIT $2",
            self.quoted
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sqlx::query_as::<_, E>(&sql)
            .bind(begin_id)
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
            .map_err(map_sqlx_error)
    }
}
