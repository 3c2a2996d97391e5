//! Retries for writes that meet a locked database.

use std::thread;
use std::time::Duration;

use chronicle_types::StoreError;
use rand::Rng;
use rusqlite::ErrorCode;

use crate::error::DbError;

const BASE_DELAY: Duration = Duration::from_millis(20);
const MAX_JITTER_MS: u64 = 10;

/// Whether `err` reports a busy or locked database.
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Runs `op` up to `retries + 1` times while it fails with a busy database,
/// sleeping 20ms plus up to 10ms of jitter between attempts.
///
/// Any other failure is returned at once.
pub(crate) fn with_retries<T>(
    retries: u32,
    mut op: impl FnMut() -> Result<T, DbError>,
) -> Result<T, StoreError> {
    let attempts = retries.saturating_add(1);
    for attempt in 1..=attempts {
        match op() {
            Err(DbError::Sqlite(err)) if is_busy(&err) => {
                if attempt < attempts {
                    let jitter = rand::thread_rng().gen_range(0..MAX_JITTER_MS);
                    tracing::warn!(attempt, "database is locked, retrying");
                    thread::sleep(BASE_DELAY + Duration::from_millis(jitter));
                }
            }
            result => return result.map_err(StoreError::from),
        }
    }
    Err(StoreError::Busy { attempts })
}
