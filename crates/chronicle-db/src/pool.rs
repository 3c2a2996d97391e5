//! Connection pool creation and configuration.

use chronicle_query::TagMatch;
use chronicle_types::{QueryLimits, WriteLimits};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

/// Runtime tunables for the SQLite store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,

    /// Extra attempts for writes that hit a locked database.
    pub retries: u32,

    /// Filter limits applied before every query and count.
    pub limits: QueryLimits,

    /// Size limits applied before every write.
    pub write_limits: WriteLimits,

    /// How the tag constraints of one filter combine.
    pub tag_match: TagMatch,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            retries: 2,
            limits: QueryLimits::default(),
            write_limits: WriteLimits::default(),
            tag_match: TagMatch::default(),
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Creates a new SQLite connection pool with WAL mode and foreign keys enabled.
///
/// # Arguments
///
/// * `db_path` - Path to the SQLite database file. Use `:memory:` for an
///   in-memory database; every pooled connection then sees its own
///   database, so pair it with a pool size of one.
///
/// # Errors
///
/// Returns the pool error if no connection can be initialised.
pub fn create_pool(db_path: &str, settings: &SqliteSettings) -> Result<DbPool, r2d2::Error> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let busy_timeout_ms = settings.busy_timeout_ms;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory" instead of "wal".
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {journal_mode}"
                    )),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {busy_timeout_ms};"
            ))
        });

    Pool::builder()
        .max_size(settings.pool_max_size.max(1))
        .build(manager)
}
