//! Manifest SQL text and prepared-statement caching
//!
//! All fixed manifest SQL lives here as named constants and runs through the
//! connection-owned statement cache: a statement is compiled once per SQL
//! text, reset on every reuse, and the whole cache is flushed before the
//! connection closes. Bulk operations build `?,?,…` placeholder lists whose
//! text differs per call, so they bypass the cache.

use rusqlite::{CachedStatement, Connection};
use tracing::error;

use super::error::StoreResult;

/// Capacity of the per-connection statement cache. The fixed statement set
/// below fits with room for pragma traffic.
pub(crate) const STATEMENT_CACHE_CAPACITY: usize = 32;

pub(crate) const CREATE_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS manifest (
  key TEXT PRIMARY KEY,
  filename TEXT,
  size INTEGER,
  inline_data BLOB,
  modification_time INTEGER,
  last_access_time INTEGER,
  extended_data BLOB
);
CREATE INDEX IF NOT EXISTS last_access_time_idx ON manifest(last_access_time);";

pub(crate) const INSERT_ITEM: &str = "INSERT OR REPLACE INTO manifest \
    (key, filename, size, inline_data, modification_time, last_access_time, extended_data) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

pub(crate) const UPDATE_ACCESS_TIME: &str =
    "UPDATE manifest SET last_access_time = ?1 WHERE key = ?2";

pub(crate) const DELETE_ITEM: &str = "DELETE FROM manifest WHERE key = ?1";

pub(crate) const DELETE_LARGER_THAN: &str = "DELETE FROM manifest WHERE size > ?1";

pub(crate) const DELETE_ACCESSED_BEFORE: &str =
    "DELETE FROM manifest WHERE last_access_time < ?1";

pub(crate) const SELECT_ITEM: &str = "SELECT key, filename, size, inline_data, \
    modification_time, last_access_time, extended_data FROM manifest WHERE key = ?1";

pub(crate) const SELECT_ITEM_INFO: &str = "SELECT key, filename, size, \
    modification_time, last_access_time, extended_data FROM manifest WHERE key = ?1";

pub(crate) const SELECT_VALUE: &str = "SELECT inline_data FROM manifest WHERE key = ?1";

pub(crate) const SELECT_FILENAME: &str = "SELECT filename FROM manifest WHERE key = ?1";

pub(crate) const SELECT_FILENAMES_LARGER_THAN: &str =
    "SELECT filename FROM manifest WHERE size > ?1 AND filename IS NOT NULL";

pub(crate) const SELECT_FILENAMES_ACCESSED_BEFORE: &str =
    "SELECT filename FROM manifest WHERE last_access_time < ?1 AND filename IS NOT NULL";

pub(crate) const SELECT_LRU_ENTRIES: &str = "SELECT key, filename, size FROM manifest \
    ORDER BY last_access_time ASC LIMIT ?1";

pub(crate) const SELECT_EXISTS: &str = "SELECT count(key) FROM manifest WHERE key = ?1";

pub(crate) const SELECT_COUNT: &str = "SELECT count(*) FROM manifest";

pub(crate) const SELECT_TOTAL_SIZE: &str = "SELECT sum(size) FROM manifest";

pub(crate) const WAL_CHECKPOINT: &str = "PRAGMA wal_checkpoint(PASSIVE)";

/// Fetch a ready-to-bind statement from the connection's cache, compiling
/// and inserting it on a miss. Compile failure is logged when enabled.
pub(crate) fn cached<'conn>(
    conn: &'conn Connection,
    sql: &str,
    log_errors: bool,
) -> StoreResult<CachedStatement<'conn>> {
    conn.prepare_cached(sql).map_err(|e| {
        if log_errors {
            error!("failed to prepare statement: {}", e);
        }
        e.into()
    })
}

/// Build a `?,?,…` placeholder list for a bulk operation.
pub(crate) fn placeholders(count: usize) -> String {
    let mut list = String::with_capacity(count.saturating_mul(2));
    for i in 0..count {
        if i > 0 {
            list.push(',');
        }
        list.push('?');
    }
    list
}
