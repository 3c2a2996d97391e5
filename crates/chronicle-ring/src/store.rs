//! The ring buffer [`Store`] implementation.

use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chronicle_query::{
    apply, compile, compile_count, replaceable_address, CompileOptions, TagMatch,
};
use chronicle_types::{
    canonical_order, AcceptAll, Event, EventPolicy, Filter, FilterPolicy, Store, StoreError,
};

use crate::ring::{Ring, RingScope};

/// Capacity used by [`RingStore::default`].
pub const DEFAULT_CAPACITY: usize = 1000;

const BACKEND: &str = "ring";

/// Bounded, thread-safe, in-memory event store.
///
/// Holds at most `capacity` events. Once full, every save silently
/// overwrites the oldest slot. One reader/writer lock guards the whole
/// arena: saves, deletes, replaces and resizes take it exclusively;
/// queries, counts and size checks share it. Nothing here performs I/O.
///
/// Given the small, fixed footprint, the store accepts every event and
/// every filter by default, including filters that select nothing specific.
pub struct RingStore {
    ring: RwLock<Ring>,
    tag_match: TagMatch,
    event_policy: Box<dyn EventPolicy>,
    filter_policy: Box<dyn FilterPolicy>,
}

impl std::fmt::Debug for RingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingStore")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl Default for RingStore {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl RingStore {
    /// Creates an empty store holding up to `capacity` events.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            ring: RwLock::new(Ring::new(capacity)),
            tag_match: TagMatch::default(),
            event_policy: Box::new(AcceptAll),
            filter_policy: Box::new(AcceptAll),
        }
    }

    /// Replaces the policy used to vet events before they are written.
    pub fn with_event_policy(mut self, policy: impl EventPolicy + 'static) -> Self {
        self.event_policy = Box::new(policy);
        self
    }

    /// Replaces the policy used to sanitize filters before queries and counts.
    pub fn with_filter_policy(mut self, policy: impl FilterPolicy + 'static) -> Self {
        self.filter_policy = Box::new(policy);
        self
    }

    /// Sets how the tag constraints of one filter combine.
    ///
    /// The default, [`TagMatch::AnyName`], matches the durable backends: an
    /// event qualifies if it carries any constrained tag name with an
    /// accepted value. Use [`TagMatch::AllNames`] for the stricter
    /// per-event filter matching where every constrained name must match.
    pub fn with_tag_match(mut self, tag_match: TagMatch) -> Self {
        self.tag_match = tag_match;
        self
    }

    /// Number of events currently stored.
    pub fn size(&self) -> usize {
        self.read().len()
    }

    /// Maximum number of events the store holds.
    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    /// Rebuilds the store at a new capacity.
    ///
    /// Stored events keep their array order; those that do not fit are
    /// dropped silently and the cursor lands just past the last kept slot.
    pub fn resize(&self, capacity: NonZeroUsize) {
        let mut ring = self.write();
        let before = ring.capacity();
        let dropped = ring.resize(capacity);
        tracing::info!(
            from = before,
            to = capacity.get(),
            dropped,
            "resized ring store"
        );
    }

    fn read(&self) -> RwLockReadGuard<'_, Ring> {
        match self.ring.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Writers never leave a slot half-written, so the arena is
                // consistent even after a panic elsewhere.
                tracing::error!("ring store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ring> {
        match self.ring.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("ring store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn sanitize(&self, filters: &[Filter]) -> Result<Vec<Filter>, StoreError> {
        if filters.is_empty() {
            return Err(StoreError::EmptyFilterList);
        }
        Ok(self.filter_policy.sanitize(filters.to_vec())?)
    }

    fn options(&self, capacity: usize) -> CompileOptions {
        CompileOptions {
            max_limit: u32::try_from(capacity).unwrap_or(u32::MAX),
            allow_unbounded: self.filter_policy.allows_unbounded(),
            tag_match: self.tag_match,
        }
    }
}

impl Store for RingStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn save(&self, event: &Event) -> Result<(), StoreError> {
        self.event_policy.validate(event)?;
        let inserted = self.write().push(event.clone());
        tracing::debug!(id = %event.id, kind = %event.kind, inserted, "saved event");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = self.write().remove(id);
        tracing::debug!(id, removed = removed.is_some(), "deleted event");
        Ok(())
    }

    fn replace(&self, event: &Event) -> Result<bool, StoreError> {
        let address = replaceable_address(event)?;
        self.event_policy.validate(event)?;

        let mut ring = self.write();
        let outcome = apply(&mut RingScope::new(&mut ring), &address, event)?;
        Ok(outcome.stored())
    }

    fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, StoreError> {
        let filters = self.sanitize(filters)?;
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let ring = self.read();
        let compiled = compile(&filters, &self.options(ring.capacity()))?;

        // Scanning newest-written first makes the per-filter caps keep the
        // most recent matches. An event counts against every filter it
        // matches, so the result is the union of each filter's own matches.
        let mut taken = vec![0u32; compiled.plans.len()];
        let mut events = Vec::new();
        for event in ring.recent() {
            let mut selected = false;
            for (plan, taken) in compiled.plans.iter().zip(taken.iter_mut()) {
                if *taken < plan.limit && plan.matches(event) {
                    *taken += 1;
                    selected = true;
                }
            }
            if selected {
                events.push(event.clone());
            }
        }
        drop(ring);

        events.sort_by(canonical_order);
        events.truncate(compiled.merge.limit(&compiled.plans));
        tracing::debug!(
            filters = filters.len(),
            returned = events.len(),
            "queried ring store"
        );
        Ok(events)
    }

    fn count(&self, filters: &[Filter]) -> Result<u64, StoreError> {
        let filters = self.sanitize(filters)?;
        if filters.is_empty() {
            return Ok(0);
        }

        let ring = self.read();
        let compiled = compile_count(&filters, &self.options(ring.capacity()))?;

        let count = compiled
            .conditions
            .iter()
            .map(|condition| ring.occupied().filter(|event| condition.matches(event)).count())
            .sum::<usize>();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::{Kind, QueryLimits, ValidationError, WriteLimits};

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero")
    }

    fn event(id: &str, kind: u16, created_at: i64) -> Event {
        Event {
            id: id.to_string(),
            author: "alice".to_string(),
            created_at,
            kind: Kind(kind),
            tags: Vec::new(),
            content: String::new(),
            signature: String::new(),
        }
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn overflow_overwrites_the_oldest_slot() {
        let store = RingStore::new(capacity(3));
        for (i, id) in ["e1", "e2", "e3", "e4"].iter().enumerate() {
            store.save(&event(id, 1, i as i64 + 1)).expect("save");
        }

        assert_eq!(store.size(), 3);
        assert_eq!(
            store.read().slot(0).map(|e| e.id.clone()),
            Some("e4".to_string())
        );

        let events = store.query(&[Filter::new()]).expect("query");
        assert_eq!(ids(&events), ["e4", "e3", "e2"]);
    }

    #[test]
    fn save_is_idempotent() {
        let store = RingStore::new(capacity(3));
        store.save(&event("a", 1, 1)).expect("save");
        store.save(&event("a", 1, 1)).expect("save");
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn delete_is_a_no_op_when_absent() {
        let store = RingStore::default();
        store.save(&event("a", 1, 1)).expect("save");
        store.delete("missing").expect("delete");
        store.delete("a").expect("delete");
        assert_eq!(store.size(), 0);
        assert_eq!(store.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn replace_overwrites_in_place() {
        let store = RingStore::new(capacity(4));
        store.save(&event("old", 0, 100)).expect("save");
        store.save(&event("other", 1, 50)).expect("save");

        assert!(!store.replace(&event("older", 0, 10)).expect("replace"));
        assert!(!store.replace(&event("same", 0, 100)).expect("replace"));
        assert!(store.replace(&event("new", 0, 200)).expect("replace"));

        let ring = store.read();
        assert_eq!(ring.slot(0).map(|e| e.id.as_str()), Some("new"));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn replace_compares_against_the_newest_saved_event() {
        let store = RingStore::new(capacity(4));
        store.save(&event("b", 0, 100)).expect("save");
        store.save(&event("a", 0, 200)).expect("save");

        assert!(!store.replace(&event("c", 0, 150)).expect("replace"));
        let live = store.query(&[Filter::new().kinds([0])]).expect("query");
        assert_eq!(ids(&live), ["a", "b"]);

        assert!(store.replace(&event("d", 0, 300)).expect("replace"));
        let live = store.query(&[Filter::new().kinds([0])]).expect("query");
        assert_eq!(ids(&live), ["d", "b"]);
    }

    #[test]
    fn overlapping_filters_keep_their_own_caps() {
        let store = RingStore::default();
        store.save(&event("y", 2, 10)).expect("save");
        store.save(&event("x", 1, 20)).expect("save");

        let events = store
            .query(&[
                Filter::new().kinds([1]).limit(1),
                Filter::new().kinds([1, 2]).limit(1),
            ])
            .expect("query");
        assert_eq!(ids(&events), ["x"]);
    }

    #[test]
    fn tag_match_mode_is_configurable() {
        let mut tagged = event("a", 1, 1);
        tagged.tags = vec![
            vec!["e".to_string(), "x".to_string()],
            vec!["t".to_string(), "rust".to_string()],
        ];
        let filter = Filter::new().tag("e", ["x"]).tag("t", ["go"]);

        let any = RingStore::default();
        any.save(&tagged).expect("save");
        assert_eq!(any.count(&[filter.clone()]).expect("count"), 1);

        let all = RingStore::default().with_tag_match(TagMatch::AllNames);
        all.save(&tagged).expect("save");
        assert_eq!(all.count(&[filter]).expect("count"), 0);
    }

    #[test]
    fn replace_rejects_regular_kinds() {
        let store = RingStore::default();
        let err = store.replace(&event("a", 1, 1)).expect_err("regular kind");
        assert!(matches!(err, StoreError::InvalidReplacement { .. }));
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn query_caps_each_filter_during_the_scan() {
        let store = RingStore::new(capacity(10));
        for i in 0..5 {
            store.save(&event(&format!("k1-{i}"), 1, i)).expect("save");
            store.save(&event(&format!("k2-{i}"), 2, i)).expect("save");
        }

        let events = store
            .query(&[
                Filter::new().kinds([1]).limit(2),
                Filter::new().kinds([2]).limit(1),
            ])
            .expect("query");
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().filter(|e| e.kind == Kind(1)).count(), 2);

        assert_eq!(
            store
                .count(&[Filter::new().kinds([1]), Filter::new().kinds([1, 2])])
                .expect("count"),
            15
        );
    }

    #[test]
    fn empty_filter_list_is_rejected_and_zero_filters_return_nothing() {
        let store = RingStore::default();
        store.save(&event("a", 1, 1)).expect("save");

        assert!(matches!(
            store.query(&[]),
            Err(StoreError::EmptyFilterList)
        ));
        assert!(store
            .query(&[Filter::new().limit(0)])
            .expect("query")
            .is_empty());
        assert_eq!(store.count(&[Filter::new().limit(0)]).expect("count"), 0);
    }

    #[test]
    fn policies_are_consulted() {
        let store = RingStore::default()
            .with_event_policy(WriteLimits {
                max_content_bytes: 1,
                ..WriteLimits::default()
            })
            .with_filter_policy(QueryLimits::default());

        let mut big = event("a", 1, 1);
        big.content = "too big".to_string();
        assert!(matches!(
            store.save(&big),
            Err(StoreError::Validation(ValidationError::ContentTooLarge { .. }))
        ));

        assert!(matches!(
            store.query(&[Filter::new()]),
            Err(StoreError::Validation(ValidationError::EmptyFilter))
        ));
    }

    #[test]
    fn resize_keeps_events_that_fit() {
        let store = RingStore::new(capacity(4));
        for i in 0..4 {
            store.save(&event(&format!("e{i}"), 1, i)).expect("save");
        }
        store.resize(capacity(2));
        assert_eq!(store.capacity(), 2);
        assert_eq!(store.size(), 2);

        store.save(&event("e9", 1, 9)).expect("save");
        let events = store.query(&[Filter::new()]).expect("query");
        assert_eq!(ids(&events), ["e9", "e1"]);
    }
}
