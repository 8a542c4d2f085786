//! Two-tier key-value caching.
//!
//! This crate provides two independently usable cache engines:
//!
//! - [`MemoryCache`]: a fast, thread-safe in-memory LRU cache with count,
//!   cost, and age limits, periodic background trimming, and a configurable
//!   release policy for evicted values.
//! - [`DiskStore`]: a durable hybrid store that keeps small values inline in
//!   an embedded SQLite manifest and large values as separate files, with
//!   LRU eviction and a trash-then-background-drain bulk delete.
//!
//! Keys are opaque strings on disk (generic hashable keys in memory); values
//! are opaque byte blobs on disk and arbitrary objects in memory. Encoding
//! application objects into bytes is left to the caller.
//!
//! # Examples
//!
//! ## Memory tier
//! ```
//! use strata_cache::{MemoryCache, MemoryCacheConfig};
//!
//! let cache: MemoryCache<String, Vec<u8>> =
//!     MemoryCache::new(MemoryCacheConfig::count_limited(1000));
//! cache.set("key".to_string(), vec![1, 2, 3]);
//! assert_eq!(cache.get(&"key".to_string()), Some(vec![1, 2, 3]));
//! ```
//!
//! ## Disk tier
//! ```no_run
//! use strata_cache::{DiskStore, DiskStoreConfig};
//!
//! let mut store = DiskStore::open(DiskStoreConfig::new("/tmp/my-cache"))?;
//! store.save("key", b"value")?;
//! assert_eq!(store.get_value("key")?.as_deref(), Some(&b"value"[..]));
//! # Ok::<(), strata_cache::StoreError>(())
//! ```
//!
//! # Concurrency
//!
//! [`MemoryCache`] is thread-safe; share it across threads behind an `Arc`.
//! [`DiskStore`] is single-caller: mutating operations take `&mut self`, and
//! concurrent use of one directory from multiple instances is undefined. For
//! sharded concurrency, open multiple stores on disjoint paths.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod memory;
pub mod storage;
pub mod time;

// Re-export commonly used types for convenience
// ------------------------------
pub use error::{ErrorClassification, ErrorSeverity};
pub use memory::{
    CacheStats, MainThreadDispatcher, MemoryCache, MemoryCacheConfig, MemoryCacheConfigBuilder,
};
pub use storage::{
    DiskStore, DiskStoreConfig, DiskStoreConfigBuilder, ManifestRow, StorageKind, StoreError,
    StoreResult,
};
pub use time::{Clock, MockClock, SystemClock};
