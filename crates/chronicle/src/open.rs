//! Building a store from configuration.

use std::num::NonZeroUsize;

use chronicle_db::{DbError, SqliteSettings, SqliteStore};
use chronicle_kv::{KvError, KvStore};
use chronicle_query::TagMatch;
use chronicle_ring::RingStore;
use chronicle_types::Store;
use thiserror::Error;

use crate::config::{Backend, Config};

/// Failure to open the configured backend.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The SQLite database could not be opened or migrated.
    #[error("failed to open sqlite store: {0}")]
    Sqlite(#[from] DbError),

    /// The redb database could not be opened.
    #[error("failed to open kv store: {0}")]
    Kv(#[from] KvError),

    /// A ring buffer must hold at least one event.
    #[error("ring capacity must be at least 1")]
    ZeroCapacity,
}

/// Opens the backend selected by `config.backend`.
///
/// The durable backends enforce `config.limits`; the ring buffer accepts
/// every event and filter.
///
/// # Errors
///
/// Returns `OpenError` if the backend cannot be opened.
pub fn open_store(config: &Config) -> Result<Box<dyn Store>, OpenError> {
    let tag_match = if config.limits.match_all_tags {
        TagMatch::AllNames
    } else {
        TagMatch::AnyName
    };

    let store: Box<dyn Store> = match config.backend {
        Backend::Sqlite => {
            let settings = SqliteSettings {
                busy_timeout_ms: config.sqlite.busy_timeout_ms,
                pool_max_size: config.sqlite.pool_max_size,
                retries: config.sqlite.retries,
                limits: config.limits.query,
                write_limits: config.limits.write,
                tag_match,
            };
            Box::new(SqliteStore::open(&config.sqlite.path, settings)?)
        }
        Backend::Kv => Box::new(
            KvStore::open(&config.kv.path)?
                .with_query_limits(config.limits.query)
                .with_event_policy(config.limits.write)
                .with_tag_match(tag_match),
        ),
        Backend::Ring => {
            let capacity =
                NonZeroUsize::new(config.ring.capacity).ok_or(OpenError::ZeroCapacity)?;
            Box::new(RingStore::new(capacity).with_tag_match(tag_match))
        }
    };

    tracing::info!(backend = store.backend(), "store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::{Event, Filter, Kind};

    fn event() -> Event {
        Event {
            id: "a".to_string(),
            author: "alice".to_string(),
            created_at: 1,
            kind: Kind(1),
            tags: Vec::new(),
            content: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn opens_every_backend() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = Config::default();
        config.sqlite.path = dir.path().join("events.db").display().to_string();
        config.kv.path = dir.path().join("events.redb").display().to_string();

        for (backend, name) in [
            (Backend::Sqlite, "sqlite"),
            (Backend::Kv, "kv"),
            (Backend::Ring, "ring"),
        ] {
            config.backend = backend;
            let store = open_store(&config).expect("store opens");
            assert_eq!(store.backend(), name);

            store.save(&event()).expect("save");
            assert_eq!(
                store.count(&[Filter::new().kinds([1])]).expect("count"),
                1
            );
        }
    }

    #[test]
    fn zero_ring_capacity_is_rejected() {
        let mut config = Config::default();
        config.backend = Backend::Ring;
        config.ring.capacity = 0;
        assert!(matches!(open_store(&config), Err(OpenError::ZeroCapacity)));
    }

    #[test]
    fn durable_backends_enforce_configured_limits() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = Config::default();
        config.backend = Backend::Kv;
        config.kv.path = dir.path().join("events.redb").display().to_string();
        config.limits.write.max_content_bytes = 1;

        let store = open_store(&config).expect("store opens");
        let mut big = event();
        big.content = "too long".to_string();
        let err = store.save(&big).expect_err("content limit");
        assert!(err.is_validation());
    }
}
