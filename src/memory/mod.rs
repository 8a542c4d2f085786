//! Fast in-memory LRU cache tier
//!
//! [`MemoryCache`] stores key-value pairs behind a single mutex over an
//! intrusive doubly-linked list with a hash index, so every access method is
//! O(1). Eviction is least-recently-used and driven by three limits: entry
//! count, total caller-assigned cost, and entry age.
//!
//! # Features
//!
//! - **Thread-safe**: one internal lock; share the cache behind an `Arc`
//! - **LRU by access**: `get` and `set` both promote the entry
//! - **Best-effort limits**: a background worker trims over-limit caches on
//!   a configurable interval and after over-limit inserts
//! - **Release policy**: evicted values can be dropped inline, on a
//!   background worker, or on the host's main thread
//! - **Lifecycle hooks**: `on_memory_pressure` / `on_enter_background`
//!   entry points for host integrations
//! - **Metrics**: optional hit/miss/eviction statistics
//!
//! # Examples
//!
//! ## Count-limited cache
//! ```
//! use strata_cache::{MemoryCache, MemoryCacheConfig};
//!
//! let cache: MemoryCache<String, i32> =
//!     MemoryCache::new(MemoryCacheConfig::count_limited(100));
//! cache.set("answer".to_string(), 42);
//! assert_eq!(cache.get(&"answer".to_string()), Some(42));
//! ```
//!
//! ## Cost-limited cache with metrics
//! ```
//! use strata_cache::{MemoryCache, MemoryCacheConfig};
//!
//! let config = MemoryCacheConfig::builder()
//!     .cost_limit(64 * 1024 * 1024)
//!     .track_metrics(true)
//!     .build();
//!
//! let cache: MemoryCache<String, Vec<u8>> = MemoryCache::new(config);
//! cache.set_with_cost("blob".to_string(), vec![0u8; 1024], 1024);
//! println!("hit rate: {:.2}%", cache.stats().hit_rate() * 100.0);
//! ```

mod config;
mod core;
mod linked_map;
mod release;
mod stats;

// Re-export public API
pub use core::MemoryCache;

pub use config::{
    LifecycleCallback, MainThreadDispatcher, MemoryCacheConfig, MemoryCacheConfigBuilder,
};
pub use stats::CacheStats;
