//! Bounded in-memory event store backed by a ring buffer.
//!
//! [`RingStore`] keeps a fixed number of events in a circular array. Saves
//! advance a write cursor and overwrite whatever the next slot holds, so
//! under steady insertion the oldest entry is evicted first. Eviction is
//! silent and lossy; the store never fails for lack of space.
//!
//! Queries and counts scan every occupied slot and evaluate the compiled
//! filters in memory, which keeps the store useful as a hot cache or as a
//! test double for the durable backends.
//!
//! ```rust,ignore
//! use chronicle_ring::RingStore;
//! use chronicle_types::{Filter, Store};
//!
//! let store = RingStore::default();
//! store.save(&event)?;
//! let recent = store.query(&[Filter::new().kinds([1]).limit(20)])?;
//! ```

mod ring;
mod store;

pub use store::{RingStore, DEFAULT_CAPACITY};
