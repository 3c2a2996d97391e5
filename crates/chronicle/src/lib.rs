//! Pluggable persistence for append-mostly event logs.
//!
//! `chronicle` puts three interchangeable backends behind one [`Store`]
//! contract:
//!
//! - [`SqliteStore`]: durable, relational, over a pooled SQLite database.
//! - [`KvStore`]: durable, embedded key-value, over redb.
//! - [`RingStore`]: bounded, in-memory, silently overwriting its oldest
//!   event once full.
//!
//! Filters compile once into a backend-neutral condition tree
//! ([`chronicle_query`]) that each backend renders its own way, and every
//! backend enforces the same last-writer-wins replacement protocol for
//! replaceable and addressable events.
//!
//! ```no_run
//! use chronicle::{load_config, open_store, Filter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(Some("chronicle.toml"))?;
//! chronicle::init_logging(&config.logging)?;
//! let store = open_store(&config)?;
//! let recent = store.query(&[Filter::new().kinds([1]).limit(20)])?;
//! # let _ = recent;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod logging;
mod open;

pub use config::{load_config, Backend, Config, ConfigError};
pub use logging::{init_logging, LoggingError};
pub use open::{open_store, OpenError};

pub use chronicle_db::{SqliteSettings, SqliteStore};
pub use chronicle_kv::KvStore;
pub use chronicle_query as query;
pub use chronicle_ring::RingStore;
pub use chronicle_types::*;
