//! SQLite engine errors and their mapping onto [`StoreError`].

use chronicle_types::StoreError;
use thiserror::Error;

use crate::migrations::MigrationError;
use crate::BACKEND;

/// Failures raised by the SQLite engine or its connection pool.
#[derive(Debug, Error)]
pub enum DbError {
    /// No pooled connection could be obtained.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A statement or transaction failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The schema could not be brought up to date.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Tags could not be encoded to, or decoded from, JSON.
    #[error("tag serialization error: {0}")]
    Tags(#[from] serde_json::Error),

    /// A stored kind does not fit the kind range.
    #[error("stored kind {0} is out of range")]
    KindOutOfRange(i64),
}

impl DbError {
    /// Whether the failure concerns a stored row rather than the engine.
    fn is_decode(&self) -> bool {
        match self {
            Self::Tags(_) | Self::KindOutOfRange(_) => true,
            Self::Sqlite(err) => matches!(
                err,
                rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::InvalidColumnType(..)
                    | rusqlite::Error::IntegralValueOutOfRange(..)
            ),
            _ => false,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_decode() {
            StoreError::decode(BACKEND, err)
        } else {
            StoreError::engine(BACKEND, err)
        }
    }
}
