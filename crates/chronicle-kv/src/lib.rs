//! Embedded key-value backend for chronicle, built on redb.
//!
//! Events are stored bincode-encoded under their id, with a time index
//! for newest-first scans and an address index for the replacement
//! protocol. See [`KvStore`].

mod error;
mod store;
mod tables;

pub(crate) const BACKEND: &str = "kv";

pub use error::KvError;
pub use store::KvStore;
