use crate::cache::StoreError;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db)
            if matches!(
                db.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
            ) =>
        {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.message().contains("read-only transaction") => {
            StoreError::ReadOnly
        }
        other @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)) => StoreError::decode(other),
        other => StoreError::database(other),
    }
}

/// Double-quotes a table name for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
