//! Manifest table access
//!
//! The manifest is the single source of truth for membership, size, and
//! access times of every stored entry. This module owns the database
//! connection and implements every query/update primitive against the
//! schema; value routing and file handling live in the engine.
//!
//! A closed connection may be reopened lazily by any operation, but only
//! while fewer than eight open failures have accumulated and at least two
//! seconds have passed since the last one; otherwise operations fail fast
//! without touching the file system.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{error, warn};

use super::error::{StoreError, StoreResult};
use super::statements::{self, placeholders};
use crate::time::{Clock, SystemClock};

const MAX_OPEN_FAILURES: u32 = 8;
const OPEN_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// One stored entry as recorded in the manifest.
///
/// `inline_data` carries the value when it lives in the database; an entry
/// with a `filename` keeps its value in the data directory instead (the
/// engine fills `inline_data` from the file on full reads).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub key: String,
    /// Name of the value file in the data directory; `None` for inline
    /// entries
    pub filename: Option<String>,
    /// Byte length of the value, regardless of placement
    pub size: u32,
    /// The value bytes, when present
    pub inline_data: Option<Vec<u8>>,
    /// Unix seconds at last save
    pub modification_time: i64,
    /// Unix seconds at last save or successful read
    pub last_access_time: i64,
    /// Opaque caller payload preserved verbatim
    pub extended_data: Option<Vec<u8>>,
}

/// Eviction candidate projection: the columns the trim loops need.
#[derive(Debug, Clone)]
pub(crate) struct LruEntry {
    pub(crate) key: String,
    pub(crate) filename: Option<String>,
    pub(crate) size: u32,
}

pub(crate) struct Manifest {
    db_path: PathBuf,
    log_errors: bool,
    conn: Option<Connection>,
    open_failures: u32,
    last_open_failure: Option<Instant>,
}

impl Manifest {
    pub(crate) fn new(db_path: PathBuf, log_errors: bool) -> Self {
        Self { db_path, log_errors, conn: None, open_failures: 0, last_open_failure: None }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the database file. Idempotent when already open.
    pub(crate) fn open(&mut self) -> StoreResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        match Connection::open(&self.db_path) {
            Ok(conn) => {
                conn.set_prepared_statement_cache_capacity(statements::STATEMENT_CACHE_CAPACITY);
                self.conn = Some(conn);
                self.open_failures = 0;
                self.last_open_failure = None;
                Ok(())
            }
            Err(e) => {
                self.open_failures += 1;
                self.last_open_failure = Some(Instant::now());
                if self.log_errors {
                    error!("failed to open manifest database: {}", e);
                }
                Err(StoreError::Open(e.to_string()))
            }
        }
    }

    /// Create the schema and apply the connection pragmas. Idempotent.
    pub(crate) fn initialize(&mut self) -> StoreResult<()> {
        let log_errors = self.log_errors;
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .and_then(|_| conn.pragma_update(None, "synchronous", "NORMAL"))
            .and_then(|_| conn.execute_batch(statements::CREATE_SCHEMA))
            .map_err(|e| op_err(log_errors, "initialize", e))
    }

    /// Close the database, finalizing all cached statements first.
    ///
    /// A busy or locked report flushes the statement cache again and
    /// retries; the loop ends only when SQLite accepts the close.
    pub(crate) fn close(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        loop {
            conn.flush_prepared_statement_cache();
            match conn.close() {
                Ok(()) => break,
                Err((returned, e)) => {
                    let busy = matches!(
                        e.sqlite_error_code(),
                        Some(rusqlite::ErrorCode::DatabaseBusy)
                            | Some(rusqlite::ErrorCode::DatabaseLocked)
                    );
                    if busy {
                        if self.log_errors {
                            warn!("manifest close reported busy, retrying: {}", e);
                        }
                        conn = returned;
                    } else {
                        if self.log_errors {
                            error!("failed to close manifest database: {}", e);
                        }
                        break;
                    }
                }
            }
        }
    }

    /// Borrow the open connection, reopening it if the guard allows.
    fn ready(&mut self) -> StoreResult<&Connection> {
        if self.conn.is_none() {
            if self.open_failures >= MAX_OPEN_FAILURES {
                return Err(StoreError::Closed);
            }
            if let Some(last) = self.last_open_failure {
                if last.elapsed() < OPEN_RETRY_INTERVAL {
                    return Err(StoreError::Closed);
                }
            }
            self.open()?;
            self.initialize()?;
        }
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    /// Insert or replace one row. With a filename the inline blob is null
    /// (the value lives in the blob store); otherwise the value is stored
    /// inline. Both timestamps are set to now; `size` is the value's byte
    /// length regardless of placement.
    pub(crate) fn save(
        &mut self,
        key: &str,
        filename: Option<&str>,
        value: &[u8],
        extended: Option<&[u8]>,
    ) -> StoreResult<()> {
        let size = u32::try_from(value.len()).map_err(|_| {
            StoreError::InvalidArgument("value exceeds the 32-bit size column".to_string())
        })?;
        let now = SystemClock.unix_seconds();
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::INSERT_ITEM, log_errors)?;
        let inline: Option<&[u8]> = if filename.is_some() { None } else { Some(value) };
        stmt.execute(params![key, filename, size, inline, now, now, extended])
            .map_err(|e| op_err(log_errors, "save", e))?;
        Ok(())
    }

    /// Set `last_access_time` to now for one key.
    pub(crate) fn bump_access_time(&mut self, key: &str) -> StoreResult<()> {
        let now = SystemClock.unix_seconds();
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::UPDATE_ACCESS_TIME, log_errors)?;
        stmt.execute(params![now, key]).map_err(|e| op_err(log_errors, "bump_access_time", e))?;
        Ok(())
    }

    /// Set `last_access_time` to now for many keys.
    pub(crate) fn bump_access_times(&mut self, keys: &[&str]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let now = SystemClock.unix_seconds();
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let sql = format!(
            "UPDATE manifest SET last_access_time = {} WHERE key IN ({})",
            now,
            placeholders(keys.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| op_err(log_errors, "bump_access_times", e))?;
        stmt.execute(params_from_iter(keys.iter()))
            .map_err(|e| op_err(log_errors, "bump_access_times", e))?;
        Ok(())
    }

    /// Remove one row. Does not touch the blob store.
    pub(crate) fn delete(&mut self, key: &str) -> StoreResult<()> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::DELETE_ITEM, log_errors)?;
        stmt.execute(params![key]).map_err(|e| op_err(log_errors, "delete", e))?;
        Ok(())
    }

    /// Remove many rows. Does not touch the blob store.
    pub(crate) fn delete_many(&mut self, keys: &[&str]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let sql = format!("DELETE FROM manifest WHERE key IN ({})", placeholders(keys.len()));
        let mut stmt = conn.prepare(&sql).map_err(|e| op_err(log_errors, "delete_many", e))?;
        stmt.execute(params_from_iter(keys.iter()))
            .map_err(|e| op_err(log_errors, "delete_many", e))?;
        Ok(())
    }

    /// Remove every row whose value is larger than `size` bytes.
    pub(crate) fn delete_larger_than(&mut self, size: u32) -> StoreResult<()> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::DELETE_LARGER_THAN, log_errors)?;
        stmt.execute(params![size]).map_err(|e| op_err(log_errors, "delete_larger_than", e))?;
        Ok(())
    }

    /// Remove every row last accessed before `timestamp` (unix seconds).
    pub(crate) fn delete_accessed_before(&mut self, timestamp: i64) -> StoreResult<()> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::DELETE_ACCESSED_BEFORE, log_errors)?;
        stmt.execute(params![timestamp])
            .map_err(|e| op_err(log_errors, "delete_accessed_before", e))?;
        Ok(())
    }

    /// Fetch one row, optionally excluding the inline blob.
    pub(crate) fn get(&mut self, key: &str, exclude_inline: bool) -> StoreResult<Option<ManifestRow>> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let sql = if exclude_inline { statements::SELECT_ITEM_INFO } else { statements::SELECT_ITEM };
        let mut stmt = statements::cached(conn, sql, log_errors)?;
        stmt.query_row(params![key], |row| row_to_entry(row, exclude_inline))
            .optional()
            .map_err(|e| op_err(log_errors, "get", e))
    }

    /// Fetch many rows. Keys with no row are omitted; any row error aborts
    /// and discards the whole batch.
    pub(crate) fn get_many(
        &mut self,
        keys: &[&str],
        exclude_inline: bool,
    ) -> StoreResult<Vec<ManifestRow>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let columns = if exclude_inline {
            "key, filename, size, modification_time, last_access_time, extended_data"
        } else {
            "key, filename, size, inline_data, modification_time, last_access_time, extended_data"
        };
        let sql = format!(
            "SELECT {} FROM manifest WHERE key IN ({})",
            columns,
            placeholders(keys.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| op_err(log_errors, "get_many", e))?;
        let rows = stmt
            .query_map(params_from_iter(keys.iter()), |row| row_to_entry(row, exclude_inline))
            .map_err(|e| op_err(log_errors, "get_many", e))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| op_err(log_errors, "get_many", e))
    }

    /// Fetch the inline blob for one key.
    pub(crate) fn get_value(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::SELECT_VALUE, log_errors)?;
        stmt.query_row(params![key], |row| row.get::<_, Option<Vec<u8>>>(0))
            .optional()
            .map(|value| value.flatten())
            .map_err(|e| op_err(log_errors, "get_value", e))
    }

    /// Fetch the filename for one key, where non-empty.
    pub(crate) fn filename(&mut self, key: &str) -> StoreResult<Option<String>> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::SELECT_FILENAME, log_errors)?;
        stmt.query_row(params![key], |row| row.get::<_, Option<String>>(0))
            .optional()
            .map(|name| name.flatten().filter(|n| !n.is_empty()))
            .map_err(|e| op_err(log_errors, "filename", e))
    }

    /// Fetch the non-empty filenames among many keys.
    pub(crate) fn filenames(&mut self, keys: &[&str]) -> StoreResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let sql = format!(
            "SELECT filename FROM manifest WHERE key IN ({}) AND filename IS NOT NULL",
            placeholders(keys.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| op_err(log_errors, "filenames", e))?;
        let rows = stmt
            .query_map(params_from_iter(keys.iter()), |row| row.get::<_, Option<String>>(0))
            .map_err(|e| op_err(log_errors, "filenames", e))?;
        collect_filenames(rows).map_err(|e| op_err(log_errors, "filenames", e))
    }

    /// Filenames of every row whose value is larger than `size` bytes.
    pub(crate) fn filenames_larger_than(&mut self, size: u32) -> StoreResult<Vec<String>> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt =
            statements::cached(conn, statements::SELECT_FILENAMES_LARGER_THAN, log_errors)?;
        let rows = stmt
            .query_map(params![size], |row| row.get::<_, Option<String>>(0))
            .map_err(|e| op_err(log_errors, "filenames_larger_than", e))?;
        collect_filenames(rows).map_err(|e| op_err(log_errors, "filenames_larger_than", e))
    }

    /// Filenames of every row last accessed before `timestamp`.
    pub(crate) fn filenames_accessed_before(&mut self, timestamp: i64) -> StoreResult<Vec<String>> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt =
            statements::cached(conn, statements::SELECT_FILENAMES_ACCESSED_BEFORE, log_errors)?;
        let rows = stmt
            .query_map(params![timestamp], |row| row.get::<_, Option<String>>(0))
            .map_err(|e| op_err(log_errors, "filenames_accessed_before", e))?;
        collect_filenames(rows).map_err(|e| op_err(log_errors, "filenames_accessed_before", e))
    }

    /// Up to `limit` eviction candidates, least recently accessed first.
    /// Ties share a timestamp second and are returned in a stable order
    /// within one query.
    pub(crate) fn lru_entries(&mut self, limit: usize) -> StoreResult<Vec<LruEntry>> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::SELECT_LRU_ENTRIES, log_errors)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(LruEntry {
                    key: row.get(0)?,
                    filename: row.get::<_, Option<String>>(1)?.filter(|n| !n.is_empty()),
                    size: row.get(2)?,
                })
            })
            .map_err(|e| op_err(log_errors, "lru_entries", e))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| op_err(log_errors, "lru_entries", e))
    }

    /// Whether a row exists for the key.
    pub(crate) fn exists(&mut self, key: &str) -> StoreResult<bool> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::SELECT_EXISTS, log_errors)?;
        let count: i64 = stmt
            .query_row(params![key], |row| row.get(0))
            .map_err(|e| op_err(log_errors, "exists", e))?;
        Ok(count > 0)
    }

    /// Total number of rows.
    pub(crate) fn count(&mut self) -> StoreResult<u64> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::SELECT_COUNT, log_errors)?;
        let count: i64 =
            stmt.query_row([], |row| row.get(0)).map_err(|e| op_err(log_errors, "count", e))?;
        Ok(count.max(0) as u64)
    }

    /// Sum of the `size` column over all rows.
    pub(crate) fn total_size(&mut self) -> StoreResult<u64> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        let mut stmt = statements::cached(conn, statements::SELECT_TOTAL_SIZE, log_errors)?;
        let sum: Option<i64> = stmt
            .query_row([], |row| row.get(0))
            .map_err(|e| op_err(log_errors, "total_size", e))?;
        Ok(sum.unwrap_or(0).max(0) as u64)
    }

    /// Request a write-ahead-log merge to bound log growth.
    pub(crate) fn checkpoint(&mut self) -> StoreResult<()> {
        let log_errors = self.log_errors;
        let conn = self.ready()?;
        conn.query_row(statements::WAL_CHECKPOINT, [], |_| Ok(()))
            .map_err(|e| op_err(log_errors, "checkpoint", e))?;
        Ok(())
    }
}

impl Drop for Manifest {
    fn drop(&mut self) {
        self.close();
    }
}

fn op_err(log_errors: bool, op: &str, e: rusqlite::Error) -> StoreError {
    if log_errors {
        error!("manifest {} failed: {}", op, e);
    }
    e.into()
}

fn collect_filenames<I>(rows: I) -> rusqlite::Result<Vec<String>>
where
    I: Iterator<Item = rusqlite::Result<Option<String>>>,
{
    let names = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(names.into_iter().flatten().filter(|n| !n.is_empty()).collect())
}

fn row_to_entry(row: &Row<'_>, exclude_inline: bool) -> rusqlite::Result<ManifestRow> {
    let key: String = row.get(0)?;
    let filename: Option<String> = row.get(1)?;
    let size: u32 = row.get(2)?;
    let (inline_data, base) = if exclude_inline {
        (None, 3)
    } else {
        (row.get::<_, Option<Vec<u8>>>(3)?, 4)
    };
    Ok(ManifestRow {
        key,
        filename: filename.filter(|f| !f.is_empty()),
        size,
        inline_data,
        modification_time: row.get(base)?,
        last_access_time: row.get(base + 1)?,
        extended_data: row.get(base + 2)?,
    })
}
