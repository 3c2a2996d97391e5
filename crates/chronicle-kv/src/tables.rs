//! Table layout and the writes that keep the tables in step.
//!
//! - `events`: id → bincode-encoded event.
//! - `by_time`: (inverted created_at, id) → (). Inverting the timestamp
//!   makes forward iteration yield newest first with ids ascending on ties.
//! - `addresses`: address key → (created_at, id) for every stored
//!   replaceable or addressable event; the greatest value is the live one.

use chronicle_types::{Address, Event, Timestamp};
use redb::{
    MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
    WriteTransaction,
};

use crate::error::KvError;

pub(crate) const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");
pub(crate) const BY_TIME: TableDefinition<(i64, &str), ()> = TableDefinition::new("by_time");
pub(crate) const ADDRESSES: MultimapTableDefinition<&str, (i64, &str)> =
    MultimapTableDefinition::new("addresses");

/// Maps a timestamp onto a key that sorts newest first.
pub(crate) fn newest_first(created_at: Timestamp) -> i64 {
    !created_at
}

pub(crate) fn encode(event: &Event) -> Result<Vec<u8>, KvError> {
    Ok(bincode::serialize(event)?)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Event, KvError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Creates every table so read transactions never miss one.
pub(crate) fn init(txn: &WriteTransaction) -> Result<(), KvError> {
    txn.open_table(EVENTS)?;
    txn.open_table(BY_TIME)?;
    txn.open_multimap_table(ADDRESSES)?;
    Ok(())
}

/// Writes `event` to every table. Returns `false` if its id is already
/// stored, in which case nothing is written.
pub(crate) fn insert_event(txn: &WriteTransaction, event: &Event) -> Result<bool, KvError> {
    let mut events = txn.open_table(EVENTS)?;
    if events.get(event.id.as_str())?.is_some() {
        return Ok(false);
    }

    let bytes = encode(event)?;
    events.insert(event.id.as_str(), bytes.as_slice())?;

    let mut by_time = txn.open_table(BY_TIME)?;
    by_time.insert((newest_first(event.created_at), event.id.as_str()), ())?;

    if let Some(address) = Address::of(event) {
        let mut addresses = txn.open_multimap_table(ADDRESSES)?;
        addresses.insert(
            address.key().as_str(),
            (event.created_at, event.id.as_str()),
        )?;
    }
    Ok(true)
}

/// Removes the event with `id` from every table. Returns the removed event.
pub(crate) fn remove_event(txn: &WriteTransaction, id: &str) -> Result<Option<Event>, KvError> {
    let mut events = txn.open_table(EVENTS)?;
    let stored = match events.remove(id)? {
        Some(bytes) => decode(bytes.value())?,
        None => return Ok(None),
    };

    let mut by_time = txn.open_table(BY_TIME)?;
    by_time.remove((newest_first(stored.created_at), id))?;

    if let Some(address) = Address::of(&stored) {
        let mut addresses = txn.open_multimap_table(ADDRESSES)?;
        addresses.remove(address.key().as_str(), (stored.created_at, id))?;
    }
    Ok(Some(stored))
}

/// The newest `(created_at, id)` stored at `address`.
pub(crate) fn live_at(
    txn: &WriteTransaction,
    address: &Address,
) -> Result<Option<(Timestamp, String)>, KvError> {
    let addresses = txn.open_multimap_table(ADDRESSES)?;
    let key = address.key();
    let mut values = addresses.get(key.as_str())?;
    let live = match values.next_back() {
        Some(entry) => {
            let guard = entry?;
            let (created_at, id) = guard.value();
            Some((created_at, id.to_string()))
        }
        None => None,
    };
    Ok(live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::Kind;
    use redb::backends::InMemoryBackend;
    use redb::Database;

    fn event(id: &str, created_at: Timestamp) -> Event {
        Event {
            id: id.to_string(),
            author: "alice".to_string(),
            created_at,
            kind: Kind(0),
            tags: Vec::new(),
            content: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn live_at_tracks_the_newest_stored_event() {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .expect("in-memory db");
        let txn = db.begin_write().expect("write txn");
        init(&txn).expect("init");
        for (id, created_at) in [("b", 100), ("a", 200), ("c", 150)] {
            assert!(insert_event(&txn, &event(id, created_at)).expect("insert"));
        }

        let address = Address::of(&event("x", 0)).expect("replaceable");
        assert_eq!(
            live_at(&txn, &address).expect("lookup"),
            Some((200, "a".to_string()))
        );

        remove_event(&txn, "a").expect("remove");
        assert_eq!(
            live_at(&txn, &address).expect("lookup"),
            Some((150, "c".to_string()))
        );
    }

    #[test]
    fn newest_first_reverses_order() {
        let mut times = vec![5, -3, i64::MIN, 0, i64::MAX, 10];
        times.sort_by_key(|t| newest_first(*t));
        assert_eq!(times, vec![i64::MAX, 10, 5, 0, -3, i64::MIN]);
    }
}
