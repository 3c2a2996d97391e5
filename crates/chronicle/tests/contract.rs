//! Behavior every backend must share.
//!
//! Each test runs against a fresh SQLite, redb and ring buffer store:
//! - Idempotent saves and no-op deletes
//! - Replace monotonicity and the supersede scenario
//! - Query/count agreement and multi-filter union semantics
//! - Canonical ordering and limits

use std::collections::HashSet;

use chronicle::{
    Event, Filter, Kind, KvStore, RingStore, SqliteSettings, SqliteStore, Store, StoreError,
};

fn stores() -> Vec<Box<dyn Store>> {
    vec![
        Box::new(SqliteStore::open_in_memory(SqliteSettings::default()).expect("sqlite store")),
        Box::new(KvStore::open_in_memory().expect("kv store")),
        Box::new(RingStore::default()),
    ]
}

fn event(id: &str, author: &str, kind: u16, created_at: i64, tags: &[(&str, &str)]) -> Event {
    Event {
        id: id.to_string(),
        author: author.to_string(),
        created_at,
        kind: Kind(kind),
        tags: tags
            .iter()
            .map(|(name, value)| vec![name.to_string(), value.to_string()])
            .collect(),
        content: format!("note {id}"),
        signature: "sig".to_string(),
    }
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

/// A small corpus with overlapping authors, kinds, tags and timestamps.
fn seed(store: &dyn Store) {
    let corpus = [
        event("e01", "alice", 1, 100, &[("t", "rust")]),
        event("e02", "bob", 1, 110, &[("t", "go"), ("p", "alice")]),
        event("e03", "alice", 7, 120, &[("e", "e01")]),
        event("e04", "carol", 1, 120, &[("t", "rust"), ("p", "bob")]),
        event("e05", "bob", 7, 130, &[]),
        event("e06", "alice", 1, 140, &[("t", "rust"), ("p", "carol")]),
    ];
    for event in &corpus {
        store.save(event).expect("seed save");
    }
}

#[test]
fn saving_twice_keeps_one_record() {
    for store in stores() {
        let stored = event("dup", "alice", 1, 10, &[("t", "x")]);
        store.save(&stored).expect("save");
        store.save(&stored).expect("duplicate save");

        let found = store.query(&[Filter::new().ids(["dup"])]).expect("query");
        assert_eq!(found, vec![stored], "{}", store.backend());
    }
}

#[test]
fn deleting_is_a_no_op_when_absent() {
    for store in stores() {
        seed(store.as_ref());
        store.delete("missing").expect("delete absent");
        store.delete("e01").expect("delete present");

        let left = store
            .count(&[Filter::new().authors(["alice"])])
            .expect("count");
        assert_eq!(left, 2, "{}", store.backend());
    }
}

#[test]
fn scenario_a_older_replacement_is_ignored_newer_supersedes() {
    for store in stores() {
        let backend = store.backend();
        store
            .save(&event("aaa", "alice", 0, 100, &[]))
            .expect("save");

        let both = Filter::new().ids(["aaa", "bbb", "ccc"]);

        assert!(!store
            .replace(&event("bbb", "alice", 0, 10, &[]))
            .expect("replace"));
        let found = store.query(&[both.clone()]).expect("query");
        assert_eq!(ids(&found), ["aaa"], "{backend}");

        assert!(store
            .replace(&event("ccc", "alice", 0, 200, &[]))
            .expect("replace"));
        let found = store.query(&[both]).expect("query");
        assert_eq!(ids(&found), ["ccc"], "{backend}");
    }
}

#[test]
fn replacement_keeps_the_maximum_timestamp() {
    let times = [50, 10, 70, 70, 30, 90, 89, 90];
    for store in stores() {
        for (i, created_at) in times.iter().enumerate() {
            store
                .replace(&event(&format!("r{i}"), "alice", 10_000, *created_at, &[]))
                .expect("replace");
        }

        let live = store
            .query(&[Filter::new().kinds([10_000]).authors(["alice"])])
            .expect("query");
        assert_eq!(ids(&live), ["r5"], "{}", store.backend());
    }
}

#[test]
fn identity_categories_are_independent() {
    for store in stores() {
        let backend = store.backend();
        assert!(store.replace(&event("a", "alice", 0, 10, &[])).expect("replace"));
        assert!(store.replace(&event("b", "bob", 0, 5, &[])).expect("other author"));
        assert!(store
            .replace(&event("c", "alice", 30_001, 5, &[("d", "one")]))
            .expect("addressable"));
        assert!(store
            .replace(&event("d", "alice", 30_001, 5, &[("d", "two")]))
            .expect("other d tag"));

        let err = store
            .replace(&event("r", "alice", 1, 10, &[]))
            .expect_err("regular kinds are not replaceable");
        assert!(matches!(err, StoreError::InvalidReplacement { .. }), "{backend}");

        let total = store
            .count(&[Filter::new().kinds([0, 30_001])])
            .expect("count");
        assert_eq!(total, 4, "{backend}");
    }
}

#[test]
fn results_are_newest_first_with_ids_breaking_ties() {
    for store in stores() {
        seed(store.as_ref());
        let found = store.query(&[Filter::new().kinds([1, 7])]).expect("query");
        assert_eq!(
            ids(&found),
            ["e06", "e05", "e03", "e04", "e02", "e01"],
            "{}",
            store.backend()
        );
    }
}

#[test]
fn single_filter_fields_combine() {
    for store in stores() {
        let backend = store.backend();
        seed(store.as_ref());

        let found = store
            .query(&[Filter::new().authors(["alice", "carol"]).kinds([1])])
            .expect("query");
        assert_eq!(ids(&found), ["e06", "e04", "e01"], "{backend}");

        let found = store
            .query(&[Filter::new().kinds([1]).since(110).until(120)])
            .expect("query");
        assert_eq!(ids(&found), ["e04", "e02"], "{backend}");

        let found = store
            .query(&[Filter::new().tag("t", ["go"]).tag("p", ["bob", "carol"])])
            .expect("query");
        assert_eq!(ids(&found), ["e06", "e04", "e02"], "{backend}");

        let found = store
            .query(&[Filter::new().kinds([1]).limit(2)])
            .expect("query");
        assert_eq!(ids(&found), ["e06", "e04"], "{backend}");
    }
}

#[test]
fn query_and_count_agree_within_limits() {
    let filter_sets = [
        vec![Filter::new().kinds([1])],
        vec![Filter::new().authors(["bob"])],
        vec![Filter::new().tag("t", ["rust", "go"])],
        vec![Filter::new().since(120)],
    ];
    for store in stores() {
        seed(store.as_ref());
        for filters in &filter_sets {
            let events = store.query(filters).expect("query");
            let count = store.count(filters).expect("count");
            assert_eq!(count, events.len() as u64, "{} {filters:?}", store.backend());
        }
    }
}

#[test]
fn multiple_filters_union_without_duplicates() {
    for store in stores() {
        let backend = store.backend();
        seed(store.as_ref());

        let first = Filter::new().authors(["alice"]);
        let second = Filter::new().tag("t", ["rust"]);

        let union = store
            .query(&[first.clone(), second.clone()])
            .expect("query");
        let left = store.query(&[first.clone()]).expect("query");
        let right = store.query(&[second.clone()]).expect("query");

        let expected: HashSet<&str> = ids(&left).into_iter().chain(ids(&right)).collect();
        let got: HashSet<&str> = ids(&union).into_iter().collect();
        assert_eq!(got, expected, "{backend}");
        assert_eq!(got.len(), union.len(), "{backend}: no duplicates");
        assert_eq!(ids(&union), ["e06", "e03", "e04", "e01"], "{backend}");

        // Counts are summed per filter, so overlaps count twice.
        let count = store.count(&[first, second]).expect("count");
        assert_eq!(count, (left.len() + right.len()) as u64, "{backend}");
    }
}

#[test]
fn overlapping_filters_with_tight_limits_union_their_own_results() {
    for store in stores() {
        let backend = store.backend();
        store.save(&event("y", "alice", 2, 10, &[])).expect("save");
        store.save(&event("x", "alice", 1, 20, &[])).expect("save");

        let first = Filter::new().kinds([1]).limit(1);
        let second = Filter::new().kinds([1, 2]).limit(1);

        let union = store
            .query(&[first.clone(), second.clone()])
            .expect("query");
        let mut separate: Vec<Event> = store.query(&[first]).expect("query");
        separate.extend(store.query(&[second]).expect("query"));
        let expected: HashSet<&str> = ids(&separate).into_iter().collect();

        assert_eq!(ids(&union), ["x"], "{backend}");
        assert_eq!(
            ids(&union).into_iter().collect::<HashSet<_>>(),
            expected,
            "{backend}"
        );
    }
}

#[test]
fn replace_competes_with_the_newest_saved_event() {
    for store in stores() {
        let backend = store.backend();
        store.save(&event("b", "alice", 0, 100, &[])).expect("save");
        store.save(&event("a", "alice", 0, 200, &[])).expect("save");

        assert!(
            !store
                .replace(&event("c", "alice", 0, 150, &[]))
                .expect("replace"),
            "{backend}"
        );
        let live = store.query(&[Filter::new().kinds([0])]).expect("query");
        assert_eq!(ids(&live), ["a", "b"], "{backend}");
    }
}

#[test]
fn filter_lists_are_validated() {
    for store in stores() {
        assert!(
            matches!(store.query(&[]), Err(StoreError::EmptyFilterList)),
            "{}",
            store.backend()
        );
        assert!(store
            .query(&[Filter::new().kinds([1]).limit(0)])
            .expect("zero-result filters are dropped")
            .is_empty());
        assert_eq!(
            store
                .count(&[Filter::new().kinds([1]).limit(0)])
                .expect("count"),
            0
        );
    }
}
