//! Fixed-length slot arena with a write cursor.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use chronicle_query::{Incumbent, ReplaceScope};
use chronicle_types::{canonical_order, Address, Event, StoreError};

/// Circular array of optional events.
///
/// Slot identity is purely positional. `index` maps every stored id to
/// its slot and is kept in lockstep with `slots`.
#[derive(Debug)]
pub(crate) struct Ring {
    slots: Vec<Option<Event>>,
    cursor: usize,
    index: HashMap<String, usize>,
}

impl Ring {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: vec![None; capacity.get()],
            cursor: 0,
            index: HashMap::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Occupied slots in array order.
    pub(crate) fn occupied(&self) -> impl Iterator<Item = &Event> {
        self.slots.iter().flatten()
    }

    /// Occupied slots from the most recently written backwards.
    pub(crate) fn recent(&self) -> impl Iterator<Item = &Event> {
        let len = self.slots.len();
        let cursor = self.cursor;
        (1..=len)
            .map(move |back| (cursor + len - back) % len)
            .filter_map(|slot| self.slots[slot].as_ref())
    }

    /// Writes `event` at the cursor and advances it, evicting whatever the
    /// slot held. Returns `false` without writing if the id is already stored.
    pub(crate) fn push(&mut self, event: Event) -> bool {
        if self.contains(&event.id) {
            return false;
        }

        let slot = self.cursor;
        if let Some(evicted) = self.slots[slot].take() {
            tracing::trace!(id = %evicted.id, slot, "evicting oldest event");
            self.index.remove(&evicted.id);
        }
        self.index.insert(event.id.clone(), slot);
        self.slots[slot] = Some(event);
        self.cursor = (self.cursor + 1) % self.slots.len();
        true
    }

    /// Clears the slot holding `id`, returning that slot.
    pub(crate) fn remove(&mut self, id: &str) -> Option<usize> {
        let slot = self.index.remove(id)?;
        self.slots[slot] = None;
        Some(slot)
    }

    /// Writes `event` into a specific, empty slot.
    fn put(&mut self, slot: usize, event: Event) {
        self.index.insert(event.id.clone(), slot);
        self.slots[slot] = Some(event);
    }

    /// Linear scan for the live event at `address`: the newest one, with
    /// the lowest id breaking timestamp ties.
    fn find(&self, address: &Address) -> Option<&Event> {
        self.occupied()
            .filter(|stored| address.contains(stored))
            .min_by(|a, b| canonical_order(a, b))
    }

    /// Rebuilds the arena at `capacity`, keeping occupied slots in array
    /// order until the new arena is full. Returns how many events were dropped.
    pub(crate) fn resize(&mut self, capacity: NonZeroUsize) -> usize {
        let capacity = capacity.get();
        let mut slots: Vec<Option<Event>> = Vec::with_capacity(capacity);
        let mut dropped = 0;

        for event in self.slots.drain(..).flatten() {
            if slots.len() < capacity {
                slots.push(Some(event));
            } else {
                dropped += 1;
            }
        }

        let kept = slots.len();
        slots.resize(capacity, None);

        self.index = slots
            .iter()
            .enumerate()
            .filter_map(|(slot, event)| event.as_ref().map(|e| (e.id.clone(), slot)))
            .collect();
        self.cursor = kept % capacity;
        self.slots = slots;
        dropped
    }

    #[cfg(test)]
    pub(crate) fn slot(&self, slot: usize) -> Option<&Event> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Replacement scope over a ring held under the exclusive lock.
///
/// A superseded event's slot is reused by its replacement, so replacing
/// overwrites in place and never evicts an unrelated event.
pub(crate) struct RingScope<'a> {
    ring: &'a mut Ring,
    vacated: Option<usize>,
}

impl<'a> RingScope<'a> {
    pub(crate) fn new(ring: &'a mut Ring) -> Self {
        Self {
            ring,
            vacated: None,
        }
    }
}

impl ReplaceScope for RingScope<'_> {
    type Error = StoreError;

    fn incumbent(&mut self, address: &Address) -> Result<Option<Incumbent>, StoreError> {
        Ok(self.ring.find(address).map(|stored| Incumbent {
            id: stored.id.clone(),
            created_at: stored.created_at,
        }))
    }

    fn insert(&mut self, event: &Event) -> Result<(), StoreError> {
        if self.ring.contains(&event.id) {
            return Ok(());
        }
        match self.vacated.take() {
            Some(slot) => self.ring.put(slot, event.clone()),
            None => {
                self.ring.push(event.clone());
            }
        }
        Ok(())
    }

    fn remove(&mut self, incumbent: &Incumbent) -> Result<(), StoreError> {
        self.vacated = self.ring.remove(&incumbent.id);
        Ok(())
    }
}
