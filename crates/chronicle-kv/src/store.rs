//! The redb [`Store`] implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;

use chronicle_query::{
    apply, compile, compile_filter, merge_events, replaceable_address, CompileOptions,
    Incumbent, Plan, ReplaceScope, TagMatch,
};
use chronicle_types::{
    canonical_order, Address, Event, EventPolicy, Filter, FilterPolicy, QueryLimits, Store,
    StoreError, WriteLimits,
};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, WriteTransaction};

use crate::error::KvError;
use crate::tables::{self, newest_first, BY_TIME, EVENTS};
use crate::BACKEND;

/// Event store over an embedded redb database.
///
/// Every write is a single redb write transaction, so saves, deletes and
/// replaces are atomic and serialize on the engine's writer lock. Queries
/// and counts read from snapshots; with several filters each filter is
/// scanned on its own thread.
pub struct KvStore {
    db: Database,
    path: Option<PathBuf>,
    max_limit: u32,
    tag_match: TagMatch,
    event_policy: Box<dyn EventPolicy>,
    filter_policy: Box<dyn FilterPolicy>,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("path", &self.path)
            .field("max_limit", &self.max_limit)
            .finish_non_exhaustive()
    }
}

impl KvStore {
    /// Creates or opens a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the file cannot be created or the tables cannot
    /// be initialised.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path)?;
        tracing::info!(path = %path.display(), "opened kv store");
        Self::init(db, Some(path))
    }

    /// Creates a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the tables cannot be initialised.
    pub fn open_in_memory() -> Result<Self, KvError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db, None)
    }

    fn init(db: Database, path: Option<PathBuf>) -> Result<Self, KvError> {
        let txn = db.begin_write()?;
        tables::init(&txn)?;
        txn.commit()?;

        let limits = QueryLimits::default();
        Ok(Self {
            db,
            path,
            max_limit: limits.max_limit,
            tag_match: TagMatch::default(),
            event_policy: Box::new(WriteLimits::default()),
            filter_policy: Box::new(limits),
        })
    }

    /// Applies `limits` to every query and count.
    pub fn with_query_limits(mut self, limits: QueryLimits) -> Self {
        self.max_limit = limits.max_limit;
        self.filter_policy = Box::new(limits);
        self
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
    pub fn with_tag_match(mut self, tag_match: TagMatch) -> Self {
        self.tag_match = tag_match;
        self
    }

    /// File backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn sanitize(&self, filters: &[Filter]) -> Result<Vec<Filter>, StoreError> {
        if filters.is_empty() {
            return Err(StoreError::EmptyFilterList);
        }
        Ok(self.filter_policy.sanitize(filters.to_vec())?)
    }

    fn options(&self) -> CompileOptions {
        CompileOptions {
            max_limit: self.max_limit,
            allow_unbounded: self.filter_policy.allows_unbounded(),
            tag_match: self.tag_match,
        }
    }

    /// Runs `scan` for every filter, on its own thread when there are
    /// several, and returns the results in filter order.
    fn fan_out<T, F>(&self, filters: &[Filter], plans: &[Plan], scan: F) -> Vec<Result<T, StoreError>>
    where
        T: Send,
        F: Fn(&Filter, &Plan) -> Result<T, KvError> + Sync,
    {
        if let ([filter], [plan]) = (filters, plans) {
            return vec![scan(filter, plan).map_err(StoreError::from)];
        }

        thread::scope(|scope| {
            let handles: Vec<_> = filters
                .iter()
                .zip(plans)
                .map(|(filter, plan)| {
                    let scan = &scan;
                    scope.spawn(move || scan(filter, plan))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result.map_err(StoreError::from),
                    Err(_) => Err(StoreError::engine(BACKEND, "filter scan panicked")),
                })
                .collect()
        })
    }

    /// Collects up to `limit` events matching one filter, newest first.
    fn scan(&self, filter: &Filter, plan: &Plan, limit: usize) -> Result<Vec<Event>, KvError> {
        let mut found = Vec::new();
        self.visit(filter, plan, |event| {
            found.push(event);
            found.len() < limit
        })?;
        Ok(found)
    }

    /// Counts the events matching one filter.
    fn tally(&self, filter: &Filter, plan: &Plan) -> Result<u64, KvError> {
        let mut count = 0;
        self.visit(filter, plan, |_| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// Feeds every event matching `plan` to `visit`, newest first, until it
    /// returns `false`.
    ///
    /// Filters with ids are served by point lookups; the rest walk the time
    /// index between the filter's bounds.
    fn visit(
        &self,
        filter: &Filter,
        plan: &Plan,
        mut visit: impl FnMut(Event) -> bool,
    ) -> Result<(), KvError> {
        let txn = self.db.begin_read()?;
        let events = txn.open_table(EVENTS)?;

        if !filter.ids.is_empty() {
            let mut seen = HashSet::new();
            let mut matched = Vec::new();
            for id in &filter.ids {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                if let Some(bytes) = events.get(id.as_str())? {
                    let event = tables::decode(bytes.value())?;
                    if plan.matches(&event) {
                        matched.push(event);
                    }
                }
            }
            matched.sort_by(canonical_order);
            for event in matched {
                if !visit(event) {
                    break;
                }
            }
            return Ok(());
        }

        let by_time = txn.open_table(BY_TIME)?;
        let start = filter.until.map_or(i64::MIN, newest_first);
        let end = filter.since.map(newest_first);

        for entry in by_time.range((start, "")..)? {
            let (key, _) = entry?;
            let (inverted, id) = key.value();
            if end.is_some_and(|end| inverted > end) {
                break;
            }
            let Some(bytes) = events.get(id)? else {
                continue;
            };
            let event = tables::decode(bytes.value())?;
            if plan.matches(&event) && !visit(event) {
                break;
            }
        }
        Ok(())
    }
}

impl Store for KvStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn save(&self, event: &Event) -> Result<(), StoreError> {
        self.event_policy.validate(event)?;

        let txn = self.db.begin_write().map_err(KvError::from)?;
        let inserted = tables::insert_event(&txn, event)?;
        txn.commit().map_err(KvError::from)?;

        tracing::debug!(id = %event.id, kind = %event.kind, inserted, "saved event");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(KvError::from)?;
        let removed = tables::remove_event(&txn, id)?;
        txn.commit().map_err(KvError::from)?;

        tracing::debug!(id, removed = removed.is_some(), "deleted event");
        Ok(())
    }

    fn replace(&self, event: &Event) -> Result<bool, StoreError> {
        let address = replaceable_address(event)?;
        self.event_policy.validate(event)?;

        let txn = self.db.begin_write().map_err(KvError::from)?;
        let outcome = apply(&mut KvScope { txn: &txn }, &address, event)?;
        txn.commit().map_err(KvError::from)?;
        Ok(outcome.stored())
    }

    fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, StoreError> {
        let filters = self.sanitize(filters)?;
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let compiled = compile(&filters, &self.options())?;
        let limit = compiled.merge.limit(&compiled.plans);
        let results = self.fan_out(&filters, &compiled.plans, |filter, plan| {
            self.scan(filter, plan, plan.limit as usize)
        });

        let mut batches = Vec::with_capacity(results.len());
        let mut failure = None;
        for result in results {
            match result {
                Ok(batch) => batches.push(batch),
                Err(err) => {
                    tracing::warn!(error = %err, "filter scan failed");
                    failure.get_or_insert(err);
                }
            }
        }

        let events = merge_events(batches, limit);
        match failure {
            None => {
                tracing::debug!(
                    filters = filters.len(),
                    returned = events.len(),
                    "queried kv store"
                );
                Ok(events)
            }
            Some(err) if events.is_empty() => Err(err),
            Some(err) => Err(StoreError::PartialQuery {
                events,
                source: Box::new(err),
            }),
        }
    }

    fn count(&self, filters: &[Filter]) -> Result<u64, StoreError> {
        let filters = self.sanitize(filters)?;
        if filters.is_empty() {
            return Ok(0);
        }

        let options = self.options();
        let plans = filters
            .iter()
            .map(|filter| compile_filter(filter, &options))
            .collect::<Result<Vec<_>, _>>()?;
        let results = self.fan_out(&filters, &plans, |filter, plan| self.tally(filter, plan));

        let mut total = 0;
        let mut succeeded = 0;
        let mut failure = None;
        for result in results {
            match result {
                Ok(count) => {
                    total += count;
                    succeeded += 1;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "filter count failed");
                    failure.get_or_insert(err);
                }
            }
        }

        match failure {
            None => Ok(total),
            Some(err) if succeeded == 0 => Err(err),
            Some(err) => Err(StoreError::PartialCount {
                count: total,
                source: Box::new(err),
            }),
        }
    }
}

/// Replacement scope over an open write transaction.
struct KvScope<'a> {
    txn: &'a WriteTransaction,
}

impl ReplaceScope for KvScope<'_> {
    type Error = KvError;

    fn incumbent(&mut self, address: &Address) -> Result<Option<Incumbent>, KvError> {
        Ok(tables::live_at(self.txn, address)?.map(|(created_at, id)| Incumbent { id, created_at }))
    }

    fn insert(&mut self, event: &Event) -> Result<(), KvError> {
        tables::insert_event(self.txn, event).map(|_| ())
    }

    fn remove(&mut self, incumbent: &Incumbent) -> Result<(), KvError> {
        tables::remove_event(self.txn, &incumbent.id).map(|_| ())
    }
}
