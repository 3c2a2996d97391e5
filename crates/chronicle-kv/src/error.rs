//! Error types for the key-value engine.

use std::io;

use chronicle_types::StoreError;
use thiserror::Error;

use crate::BACKEND;

/// Failures raised by redb or by event (de)serialization.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("database creation error: {0}")]
    DatabaseCreation(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),
}

impl From<KvError> for StoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Serialization(_) => StoreError::decode(BACKEND, err),
            _ => StoreError::engine(BACKEND, err),
        }
    }
}
