//! The uniform contract every backend implements.

use crate::error::StoreError;
use crate::event::Event;
use crate::filter::Filter;

/// A persistence backend for events.
///
/// All operations are synchronous and safe to call from many threads at
/// once. Callers on an async runtime run them on a blocking task.
pub trait Store: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Stores `event` unless an event with the same id is already stored.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the event policy rejects the event, or
    /// an engine error if the write fails.
    fn save(&self, event: &Event) -> Result<(), StoreError>;

    /// Removes the event with `id`. Does nothing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the delete fails.
    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Stores `event` if it is strictly newer than the live event of its
    /// identity category, superseding that event atomically.
    ///
    /// Returns whether `event` was stored. Equal timestamps never replace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidReplacement`] for regular kinds.
    fn replace(&self, event: &Event) -> Result<bool, StoreError>;

    /// Returns the union of events matching any filter, newest first and
    /// bounded by the filters' limits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyFilterList`] without filters, a validation
    /// error if the filter policy rejects them, or an engine error.
    fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, StoreError>;

    /// Returns the sum of per-filter match counts.
    ///
    /// An event matching several filters is counted once per filter.
    ///
    /// # Errors
    ///
    /// Same as [`Store::query`]. Backends that count filters independently
    /// may report [`StoreError::PartialCount`].
    fn count(&self, filters: &[Filter]) -> Result<u64, StoreError>;
}
