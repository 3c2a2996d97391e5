//! SQLite backend for chronicle.
//!
//! Provides connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and [`SqliteStore`], which implements the
//! [`Store`](chronicle_types::Store) contract over an `events` table and an
//! `event_tags` association table.
//!
//! # Design decisions
//!
//! - **WAL mode**: concurrent readers with a single writer. Reads never
//!   wait on writes, so only writes are retried on a locked database.
//! - **Parameterised statements only**: queries are rendered by
//!   `chronicle_query::sql` with `?` placeholders; filter values are
//!   always bound, never interpolated.
//! - **Immediate transactions for replacement**: the write lock is held
//!   from the incumbent lookup to the commit.

mod error;
mod migrations;
mod pool;
mod retry;
mod store;

pub(crate) const BACKEND: &str = "sqlite";

pub use error::DbError;
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, SqliteSettings};
pub use retry::is_busy;
pub use store::SqliteStore;
