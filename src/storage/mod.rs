//! Durable disk cache tier
//!
//! [`DiskStore`] is a hybrid key-value store: small values live inline in an
//! embedded SQLite manifest, large values live as separate files in a data
//! directory, and the manifest is the single source of truth for
//! membership, sizes, and access times. Eviction is least-recently-used by
//! access time; bulk removal stages the data directory into a trash
//! directory and drains it on a background worker.
//!
//! On-disk layout under the store root:
//!
//! ```text
//! <root>/manifest.sqlite       embedded database
//! <root>/manifest.sqlite-shm   shared-memory index (WAL)
//! <root>/manifest.sqlite-wal   write-ahead log
//! <root>/data/                 value files, one per out-of-line entry
//! <root>/trash/                pending-deletion subtrees
//! ```
//!
//! The store is **not** thread-safe: mutating operations take `&mut self`,
//! and running two stores over one directory is undefined. Shard across
//! disjoint paths for concurrency.

mod blob;
mod config;
mod core;
pub mod error;
mod manifest;
mod statements;

pub(crate) const DB_FILE_NAME: &str = "manifest.sqlite";
pub(crate) const DB_SHM_FILE_NAME: &str = "manifest.sqlite-shm";
pub(crate) const DB_WAL_FILE_NAME: &str = "manifest.sqlite-wal";
pub(crate) const DATA_DIR_NAME: &str = "data";
pub(crate) const TRASH_DIR_NAME: &str = "trash";

// Re-export public API
pub use core::DiskStore;

pub use config::{DiskStoreConfig, DiskStoreConfigBuilder, StorageKind};
pub use error::{StoreError, StoreResult};
pub use manifest::ManifestRow;
