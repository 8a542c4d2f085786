//! Memory-cache statistics and metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics snapshot for cache performance monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Current number of entries
    pub count: usize,

    /// Current total cost of entries
    pub cost: usize,

    /// Total number of successful get operations
    pub hits: u64,

    /// Total number of failed get operations
    pub misses: u64,

    /// Total number of set operations
    pub inserts: u64,

    /// Total number of entries evicted by a limit-driven trim
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate (hits / total accesses)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate miss rate (misses / total accesses)
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    /// Total number of access operations (hits + misses)
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Thread-safe metrics collector using lock-free atomic counters
#[derive(Debug)]
pub(crate) struct MetricsCollector {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    inserts: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            hits: Arc::clone(&self.hits),
            misses: Arc::clone(&self.misses),
            inserts: Arc::clone(&self.inserts),
            evictions: Arc::clone(&self.evictions),
        }
    }
}

impl MetricsCollector {
    pub(crate) fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            inserts: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, count: usize, cost: usize) -> CacheStats {
        CacheStats {
            count,
            cost,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for memory::stats.
    use super::*;

    /// Validates `CacheStats::hit_rate` behavior for the rate calculation
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `(stats.hit_rate() - 0.8).abs() < 1e-10` evaluates to true.
    /// - Confirms `stats.total_accesses()` equals `100`.
    #[test]
    fn test_hit_rate_calculation() {
        let stats = CacheStats { hits: 80, misses: 20, ..Default::default() };

        assert!((stats.hit_rate() - 0.8).abs() < 1e-10);
        assert!((stats.miss_rate() - 0.2).abs() < 1e-10);
        assert_eq!(stats.total_accesses(), 100);
    }

    /// Validates `CacheStats::hit_rate` behavior for the no accesses scenario.
    ///
    /// Assertions:
    /// - Confirms `stats.hit_rate()` equals `0.0`.
    /// - Confirms `stats.miss_rate()` equals `1.0`.
    #[test]
    fn test_hit_rate_no_accesses() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 1.0);
    }

    /// Validates `MetricsCollector` recording across operations.
    ///
    /// Assertions:
    /// - Confirms each counter reflects the recorded operations.
    /// - Confirms the snapshot carries the supplied count and cost gauges.
    #[test]
    fn test_collector_records_operations() {
        let collector = MetricsCollector::new();

        collector.record_hit();
        collector.record_miss();
        collector.record_insert();
        collector.record_evictions(3);

        let stats = collector.snapshot(5, 640);

        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.cost, 640);
    }

    /// Validates `MetricsCollector::reset` behavior.
    ///
    /// Assertions:
    /// - Confirms all counters read zero after the reset.
    #[test]
    fn test_collector_reset() {
        let collector = MetricsCollector::new();
        collector.record_hit();
        collector.record_insert();

        collector.reset();

        let stats = collector.snapshot(0, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.inserts, 0);
    }

    /// Validates `MetricsCollector::clone` behavior for the shared counters
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms both clones observe the combined hit count.
    #[test]
    fn test_collector_clone_shares_counters() {
        let collector = MetricsCollector::new();
        collector.record_hit();

        let clone = collector.clone();
        clone.record_hit();

        assert_eq!(collector.snapshot(0, 0).hits, 2);
        assert_eq!(clone.snapshot(0, 0).hits, 2);
    }
}
