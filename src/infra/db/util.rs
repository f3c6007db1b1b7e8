use crate::application::repos::StoreError;

const UNIQUE_VIOLATION: &str = "23505";
const QUERY_CANCELED: &str = "57014";

/// Classify driver errors by SQLSTATE so callers can tell a lost insert
/// race from an outage.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => StoreError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            Some(QUERY_CANCELED) => StoreError::Timeout,
            _ => StoreError::from_persistence(db.message()),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        other => StoreError::from_persistence(other),
    }
}

pub(super) fn port_from_db(value: i32) -> Result<u16, StoreError> {
    u16::try_from(value)
        .map_err(|_| StoreError::from_persistence(format!("site port {value} out of range")))
}
