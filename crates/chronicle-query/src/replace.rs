//! Last-writer-wins replacement shared by every backend.
//!
//! A backend opens whatever atomic scope its engine offers (a transaction,
//! a write batch, an exclusive lock) and hands it to [`apply`] as a
//! [`ReplaceScope`]. The protocol itself holds no state: it looks up the
//! live event of the incoming event's identity category and decides whether
//! to insert, supersede, or keep. Concurrent replaces on the same category
//! serialize on the backend's scope, so exactly one event survives.

use chronicle_types::{Address, Event, StoreError, Timestamp};

/// The live event currently occupying an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incumbent {
    /// Id of the live event.
    pub id: String,
    /// Its creation time.
    pub created_at: Timestamp,
}

/// What [`apply`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// No live event existed; the new event was inserted.
    Inserted,
    /// The older live event was removed and the new event inserted.
    Superseded {
        /// The event that was removed.
        previous: Incumbent,
    },
    /// The live event is newer or equally old; nothing changed.
    Kept {
        /// The event that stays live.
        incumbent: Incumbent,
    },
}

impl ReplaceOutcome {
    /// Whether the new event was stored.
    pub fn stored(&self) -> bool {
        !matches!(self, Self::Kept { .. })
    }
}

/// Engine operations the protocol needs inside one atomic scope.
pub trait ReplaceScope {
    /// Error type of the backing engine.
    type Error;

    /// Finds the live event at `address`.
    fn incumbent(&mut self, address: &Address) -> Result<Option<Incumbent>, Self::Error>;

    /// Inserts `event`.
    fn insert(&mut self, event: &Event) -> Result<(), Self::Error>;

    /// Removes the superseded `incumbent`.
    fn remove(&mut self, incumbent: &Incumbent) -> Result<(), Self::Error>;
}

/// Returns the address `event` competes for.
///
/// This is the protocol's first step and runs before any scope is opened.
///
/// # Errors
///
/// Returns [`StoreError::InvalidReplacement`] for regular kinds.
pub fn replaceable_address(event: &Event) -> Result<Address, StoreError> {
    Address::of(event).ok_or_else(|| StoreError::InvalidReplacement {
        id: event.id.clone(),
        kind: event.kind,
    })
}

/// Runs the replacement protocol for `event` at `address` inside `scope`.
///
/// Equal timestamps never replace. When superseding, the old event is
/// removed before the new one is inserted; both writes happen in the same
/// scope, so no observer sees both or neither.
///
/// # Errors
///
/// Propagates the scope's engine errors. The caller must discard the scope
/// (roll back) on error.
pub fn apply<S: ReplaceScope>(
    scope: &mut S,
    address: &Address,
    event: &Event,
) -> Result<ReplaceOutcome, S::Error> {
    let outcome = match scope.incumbent(address)? {
        None => {
            scope.insert(event)?;
            ReplaceOutcome::Inserted
        }
        Some(incumbent) if incumbent.created_at < event.created_at => {
            scope.remove(&incumbent)?;
            scope.insert(event)?;
            ReplaceOutcome::Superseded {
                previous: incumbent,
            }
        }
        Some(incumbent) => ReplaceOutcome::Kept { incumbent },
    };

    tracing::debug!(
        id = %event.id,
        %address,
        stored = outcome.stored(),
        "replacement protocol applied"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::Kind;
    use std::collections::HashMap;

    /// Map-backed scope for exercising the protocol in isolation.
    #[derive(Default)]
    struct MapScope {
        events: HashMap<String, Event>,
        writes: Vec<String>,
    }

    impl ReplaceScope for MapScope {
        type Error = StoreError;

        fn incumbent(&mut self, address: &Address) -> Result<Option<Incumbent>, StoreError> {
            Ok(self
                .events
                .values()
                .find(|stored| address.contains(stored))
                .map(|stored| Incumbent {
                    id: stored.id.clone(),
                    created_at: stored.created_at,
                }))
        }

        fn insert(&mut self, event: &Event) -> Result<(), StoreError> {
            self.writes.push(format!("insert {}", event.id));
            self.events.insert(event.id.clone(), event.clone());
            Ok(())
        }

        fn remove(&mut self, incumbent: &Incumbent) -> Result<(), StoreError> {
            self.writes.push(format!("remove {}", incumbent.id));
            self.events.remove(&incumbent.id);
            Ok(())
        }
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

    fn run(scope: &mut MapScope, event: &Event) -> ReplaceOutcome {
        let address = replaceable_address(event).expect("replaceable");
        apply(scope, &address, event).expect("map scope never fails")
    }

    #[test]
    fn regular_kinds_are_rejected_before_any_write() {
        let err = replaceable_address(&event("a", 1, 10)).expect_err("kind 1 is regular");
        assert!(matches!(err, StoreError::InvalidReplacement { .. }));
    }

    #[test]
    fn inserts_when_address_is_free() {
        let mut scope = MapScope::default();
        assert_eq!(run(&mut scope, &event("a", 0, 10)), ReplaceOutcome::Inserted);
        assert_eq!(scope.writes, ["insert a"]);
    }

    #[test]
    fn newer_event_supersedes() {
        let mut scope = MapScope::default();
        run(&mut scope, &event("a", 0, 10));
        let outcome = run(&mut scope, &event("b", 0, 20));

        assert!(outcome.stored());
        assert_eq!(
            outcome,
            ReplaceOutcome::Superseded {
                previous: Incumbent {
                    id: "a".into(),
                    created_at: 10
                }
            }
        );
        assert_eq!(scope.writes, ["insert a", "remove a", "insert b"]);
        assert_eq!(scope.events.len(), 1);
    }

    #[test]
    fn older_or_equal_event_is_kept_out() {
        let mut scope = MapScope::default();
        run(&mut scope, &event("a", 0, 10));

        assert!(!run(&mut scope, &event("b", 0, 5)).stored());
        assert!(!run(&mut scope, &event("c", 0, 10)).stored());
        assert_eq!(scope.writes, ["insert a"]);
        assert!(scope.events.contains_key("a"));
    }

    #[test]
    fn monotone_over_any_sequence() {
        let mut scope = MapScope::default();
        let times = [50, 10, 70, 70, 30, 90, 89];
        for (i, created_at) in times.iter().enumerate() {
            run(&mut scope, &event(&format!("e{i}"), 10_002, *created_at));
        }
        assert_eq!(scope.events.len(), 1);
        let live = scope.events.values().next().expect("one live event");
        assert_eq!(live.created_at, 90);
    }
}
