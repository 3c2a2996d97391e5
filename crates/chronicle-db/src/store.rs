//! The SQLite [`Store`] implementation.

use chronicle_query::sql::{render_count, render_plan, SqlQuery};
use chronicle_query::{
    apply, compile, compile_count, merge_events, replaceable_address, CompileOptions,
    CompiledCount, CompiledQuery, Incumbent, Param, ReplaceScope, TagMatch,
};
use chronicle_types::{Address, Event, EventPolicy, Filter, FilterPolicy, Kind, Store, StoreError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::error::DbError;
use crate::migrations::run_migrations;
use crate::pool::{create_pool, DbPool, SqliteSettings};
use crate::retry::with_retries;
use crate::BACKEND;

const INSERT_EVENT: &str = "INSERT OR IGNORE INTO events (id, pubkey, created_at, kind, tags, content, sig)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const INSERT_TAG: &str = "INSERT OR IGNORE INTO event_tags (event_id, name, value) VALUES (?1, ?2, ?3)";

const LIVE_REPLACEABLE: &str = "SELECT id, created_at FROM events
     WHERE kind = ?1 AND pubkey = ?2
     ORDER BY created_at DESC, id ASC LIMIT 1";

const LIVE_ADDRESSABLE: &str = "SELECT e.id, e.created_at FROM events AS e
     JOIN event_tags AS t ON t.event_id = e.id
     WHERE e.kind = ?1 AND e.pubkey = ?2 AND t.name = 'd' AND t.value = ?3
     ORDER BY e.created_at DESC, e.id ASC LIMIT 1";

// Events without a `d` tag, or with an empty one, share the empty address.
const LIVE_ADDRESSABLE_EMPTY: &str = "SELECT e.id, e.created_at FROM events AS e
     WHERE e.kind = ?1 AND e.pubkey = ?2 AND NOT EXISTS (
         SELECT 1 FROM event_tags AS t
         WHERE t.event_id = e.id AND t.name = 'd' AND t.value <> ''
     )
     ORDER BY e.created_at DESC, e.id ASC LIMIT 1";

/// Event store over a pooled SQLite database.
///
/// Events live in the `events` table; every tag with a name and a value is
/// also written to `event_tags`, which is what tag filters match against.
/// Writes that meet a locked database are retried a configurable number
/// of times.
pub struct SqliteStore {
    pool: DbPool,
    retries: u32,
    max_limit: u32,
    tag_match: TagMatch,
    event_policy: Box<dyn EventPolicy>,
    filter_policy: Box<dyn FilterPolicy>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("retries", &self.retries)
            .field("max_limit", &self.max_limit)
            .field("tag_match", &self.tag_match)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the pool cannot be built or a migration fails.
    pub fn open(path: &str, settings: SqliteSettings) -> Result<Self, DbError> {
        let pool = create_pool(path, &settings)?;
        let applied = run_migrations(&*pool.get()?)?;
        tracing::info!(
            path,
            applied,
            pool_max_size = settings.pool_max_size,
            "opened sqlite store"
        );

        Ok(Self {
            pool,
            retries: settings.retries,
            max_limit: settings.limits.max_limit,
            tag_match: settings.tag_match,
            event_policy: Box::new(settings.write_limits),
            filter_policy: Box::new(settings.limits),
        })
    }

    /// Opens a private in-memory database on a single pooled connection.
    ///
    /// # Errors
    ///
    /// Same as [`SqliteStore::open`].
    pub fn open_in_memory(settings: SqliteSettings) -> Result<Self, DbError> {
        Self::open(
            ":memory:",
            SqliteSettings {
                pool_max_size: 1,
                ..settings
            },
        )
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

    /// The underlying connection pool, for schemas and queries of your own.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Queries with statements produced by `build` instead of the default
    /// one-statement-per-filter rendering.
    ///
    /// Rows from every statement are merged: deduplicated by id, ordered
    /// newest first and truncated to the compiled merge limit.
    ///
    /// # Errors
    ///
    /// As [`Store::query`]. When a statement fails after others already
    /// produced rows, returns [`StoreError::PartialQuery`] carrying the rows
    /// of the statements that completed. Rows the failing statement read
    /// before failing are discarded.
    pub fn query_with<B>(&self, filters: &[Filter], build: B) -> Result<Vec<Event>, StoreError>
    where
        B: FnOnce(&CompiledQuery) -> Vec<SqlQuery>,
    {
        let filters = self.sanitize(filters)?;
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let compiled = compile(&filters, &self.options())?;
        let limit = compiled.merge.limit(&compiled.plans);
        let statements = build(&compiled);

        let conn = self.pool.get().map_err(DbError::from)?;
        let mut batches = Vec::with_capacity(statements.len());
        for statement in &statements {
            match fetch(&conn, statement) {
                Ok(batch) => batches.push(batch),
                Err(err) => {
                    let err = StoreError::from(err);
                    let collected: usize = batches.iter().map(Vec::len).sum();
                    tracing::warn!(
                        sql = %statement.sql,
                        collected,
                        error = %err,
                        "query statement failed"
                    );
                    if collected == 0 {
                        return Err(err);
                    }
                    return Err(StoreError::PartialQuery {
                        events: merge_events(batches, limit),
                        source: Box::new(err),
                    });
                }
            }
        }

        let events = merge_events(batches, limit);
        tracing::debug!(
            filters = filters.len(),
            statements = statements.len(),
            returned = events.len(),
            "queried sqlite store"
        );
        Ok(events)
    }

    /// Counts with statements produced by `build`; each must return a
    /// single integer, and the results are summed.
    ///
    /// # Errors
    ///
    /// As [`Store::count`]. When a statement fails after others already
    /// succeeded, returns [`StoreError::PartialCount`] with their sum.
    pub fn count_with<B>(&self, filters: &[Filter], build: B) -> Result<u64, StoreError>
    where
        B: FnOnce(&CompiledCount) -> Vec<SqlQuery>,
    {
        let filters = self.sanitize(filters)?;
        if filters.is_empty() {
            return Ok(0);
        }

        let compiled = compile_count(&filters, &self.options())?;
        let statements = build(&compiled);

        let conn = self.pool.get().map_err(DbError::from)?;
        let mut total: u64 = 0;
        for (done, statement) in statements.iter().enumerate() {
            let count = conn
                .query_row(
                    &statement.sql,
                    params_from_iter(statement.params.iter().map(to_value)),
                    |row| row.get::<_, i64>(0),
                )
                .map_err(DbError::from);

            match count {
                Ok(count) => total += u64::try_from(count).unwrap_or_default(),
                Err(err) => {
                    let err = StoreError::from(err);
                    tracing::warn!(sql = %statement.sql, error = %err, "count statement failed");
                    if done == 0 {
                        return Err(err);
                    }
                    return Err(StoreError::PartialCount {
                        count: total,
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(total)
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
}

impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn save(&self, event: &Event) -> Result<(), StoreError> {
        self.event_policy.validate(event)?;

        let inserted = with_retries(self.retries, || {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            let inserted = insert_event(&tx, event)?;
            tx.commit()?;
            Ok(inserted)
        })?;

        tracing::debug!(id = %event.id, kind = %event.kind, inserted, "saved event");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = with_retries(self.retries, || {
            let conn = self.pool.get()?;
            Ok(conn.execute("DELETE FROM events WHERE id = ?1", [id])?)
        })?;

        tracing::debug!(id, removed, "deleted event");
        Ok(())
    }

    fn replace(&self, event: &Event) -> Result<bool, StoreError> {
        let address = replaceable_address(event)?;
        self.event_policy.validate(event)?;

        let outcome = with_retries(self.retries, || {
            let mut conn = self.pool.get()?;
            // Immediate: the write lock is taken before the incumbent is
            // read, so concurrent replaces serialize here.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = apply(&mut SqlScope { conn: &tx }, &address, event)?;
            tx.commit()?;
            Ok(outcome)
        })?;

        Ok(outcome.stored())
    }

    fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, StoreError> {
        self.query_with(filters, |compiled| {
            compiled.plans.iter().map(render_plan).collect()
        })
    }

    fn count(&self, filters: &[Filter]) -> Result<u64, StoreError> {
        self.count_with(filters, |compiled| vec![render_count(compiled)])
    }
}

/// Replacement scope over an open `IMMEDIATE` transaction.
struct SqlScope<'a> {
    conn: &'a Connection,
}

impl ReplaceScope for SqlScope<'_> {
    type Error = DbError;

    fn incumbent(&mut self, address: &Address) -> Result<Option<Incumbent>, DbError> {
        let kind = address.kind.as_u16();
        let row = |row: &Row<'_>| -> rusqlite::Result<Incumbent> {
            Ok(Incumbent {
                id: row.get(0)?,
                created_at: row.get(1)?,
            })
        };

        let live = match address.d.as_deref() {
            None => self
                .conn
                .prepare_cached(LIVE_REPLACEABLE)?
                .query_row(params![kind, address.author], row),
            Some("") => self
                .conn
                .prepare_cached(LIVE_ADDRESSABLE_EMPTY)?
                .query_row(params![kind, address.author], row),
            Some(d) => self
                .conn
                .prepare_cached(LIVE_ADDRESSABLE)?
                .query_row(params![kind, address.author, d], row),
        };
        Ok(live.optional()?)
    }

    fn insert(&mut self, event: &Event) -> Result<(), DbError> {
        insert_event(self.conn, event).map(|_| ())
    }

    fn remove(&mut self, incumbent: &Incumbent) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM events WHERE id = ?1", [&incumbent.id])?;
        Ok(())
    }
}

/// Inserts `event` and its tag rows. Returns `false` if the id was
/// already stored, in which case nothing is written.
fn insert_event(conn: &Connection, event: &Event) -> Result<bool, DbError> {
    let tags = serde_json::to_string(&event.tags)?;
    let inserted = conn.prepare_cached(INSERT_EVENT)?.execute(params![
        event.id,
        event.author,
        event.created_at,
        event.kind.as_u16(),
        tags,
        event.content,
        event.signature,
    ])? == 1;

    if inserted {
        let mut stmt = conn.prepare_cached(INSERT_TAG)?;
        for (name, value) in event.indexed_tags() {
            stmt.execute(params![event.id, name, value])?;
        }
    }
    Ok(inserted)
}

fn fetch(conn: &Connection, statement: &SqlQuery) -> Result<Vec<Event>, DbError> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let mut rows = stmt.query(params_from_iter(statement.params.iter().map(to_value)))?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(decode_event(row)?);
    }
    Ok(events)
}

fn decode_event(row: &Row<'_>) -> Result<Event, DbError> {
    let kind: i64 = row.get("kind")?;
    let kind = u16::try_from(kind).map_err(|_| DbError::KindOutOfRange(kind))?;
    let tags: String = row.get("tags")?;

    Ok(Event {
        id: row.get("id")?,
        author: row.get("pubkey")?,
        created_at: row.get("created_at")?,
        kind: Kind(kind),
        tags: serde_json::from_str(&tags)?,
        content: row.get("content")?,
        signature: row.get("sig")?,
    })
}

fn to_value(param: &Param) -> Value {
    match param {
        Param::Text(text) => Value::Text(text.clone()),
        Param::Int(n) => Value::Integer(*n),
    }
}
