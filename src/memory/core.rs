//! Thread-safe in-memory LRU cache engine
//!
//! A single mutex guards the linked map and its aggregates. The mutex is
//! held for structural mutation only: evicted nodes are moved into a local
//! holder inside the critical section and released outside it, so value
//! destruction never extends lock hold times.

use std::hash::Hash;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::config::MemoryCacheConfig;
use super::linked_map::{LinkedMap, Node};
use super::release::Releaser;
use super::stats::{CacheStats, MetricsCollector};
use crate::time::{Clock, SystemClock};

/// State shared between the cache handle and the background trimmer.
struct Shared<K, V, C>
where
    K: Eq + Hash + Clone,
{
    map: Mutex<LinkedMap<K, V>>,
    config: MemoryCacheConfig,
    releaser: Releaser,
    metrics: MetricsCollector,
    clock: C,
}

impl<K, V, C> Shared<K, V, C>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
    C: Clock,
{
    /// Evict tail nodes while `over` holds, releasing them outside the lock.
    fn evict_tail_while<F>(&self, mut over: F)
    where
        F: FnMut(&LinkedMap<K, V>) -> bool,
    {
        let holder: Vec<Node<K, V>> = {
            let mut map = self.map.lock().unwrap();
            let mut holder = Vec::new();
            while over(&map) {
                match map.remove_tail() {
                    Some(node) => holder.push(node),
                    None => break,
                }
            }
            holder
        };
        if holder.is_empty() {
            return;
        }
        if self.config.track_metrics {
            self.metrics.record_evictions(holder.len() as u64);
        }
        self.releaser.release(holder);
    }

    fn trim_to_count(&self, count: usize) {
        self.evict_tail_while(|map| map.len() > count);
    }

    fn trim_to_cost(&self, cost: usize) {
        self.evict_tail_while(|map| map.total_cost() > cost);
    }

    fn trim_to_age(&self, age: Duration) {
        let now = self.clock.now();
        self.evict_tail_while(|map| {
            map.tail().is_some_and(|node| now.duration_since(node.accessed_at) > age)
        });
    }

    /// One pass of the periodic limit check: count, cost, age, in order.
    fn trim_all(&self) {
        if let Some(limit) = self.config.count_limit {
            self.trim_to_count(limit);
        }
        if let Some(limit) = self.config.cost_limit {
            self.trim_to_cost(limit);
        }
        if let Some(limit) = self.config.age_limit {
            self.trim_to_age(limit);
        }
    }
}

/// Fast in-memory key-value cache with LRU eviction.
///
/// Entries are evicted least-recently-used first when the configured count,
/// cost, or age limits are exceeded. Limits are enforced best-effort by a
/// periodic background check (and an immediate asynchronous check after an
/// over-limit `set`), not synchronously on every call.
///
/// All methods are thread-safe; share the cache behind an `Arc`. Access
/// methods run in O(1).
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone + Send`)
/// - `V`: Value type (must be `Clone + Send`)
/// - `C`: Clock type for age-based trimming (defaults to [`SystemClock`])
///
/// # Example
/// ```
/// use strata_cache::{MemoryCache, MemoryCacheConfig};
///
/// let cache: MemoryCache<String, Vec<u8>> =
///     MemoryCache::new(MemoryCacheConfig::count_limited(1000));
/// cache.set("key".to_string(), vec![1, 2, 3]);
/// assert_eq!(cache.get(&"key".to_string()), Some(vec![1, 2, 3]));
/// ```
pub struct MemoryCache<K, V, C = SystemClock>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    shared: Arc<Shared<K, V, C>>,
    trim_signal: Option<Sender<()>>,
    trimmer: Option<JoinHandle<()>>,
}

impl<K, V> MemoryCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a new cache with the given configuration using the system
    /// clock
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> MemoryCache<K, V, C>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    C: Clock + Clone,
{
    /// Create a new cache with a custom clock (useful for testing)
    pub fn with_clock(config: MemoryCacheConfig, clock: C) -> Self {
        let releaser = Releaser::new(
            config.release_async,
            config.release_on_main_thread,
            config.main_thread_dispatcher.clone(),
        );
        let shared = Arc::new(Shared {
            map: Mutex::new(LinkedMap::new()),
            config,
            releaser,
            metrics: MetricsCollector::new(),
            clock,
        });
        let (trim_signal, trimmer) = spawn_trimmer(Arc::downgrade(&shared));
        Self { shared, trim_signal, trimmer }
    }

    /// Check whether a key is in the cache without refreshing its position
    pub fn contains(&self, key: &K) -> bool {
        self.shared.map.lock().unwrap().contains(key)
    }

    /// Get the value associated with a key
    ///
    /// A hit refreshes the entry's access time and moves it to the
    /// most-recently-used position.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = {
            let mut map = self.shared.map.lock().unwrap();
            match map.handle(key) {
                Some(handle) => {
                    map.touch(handle, self.shared.clock.now());
                    map.node(handle).map(|node| node.value.clone())
                }
                None => None,
            }
        };
        if self.shared.config.track_metrics {
            match value {
                Some(_) => self.shared.metrics.record_hit(),
                None => self.shared.metrics.record_miss(),
            }
        }
        value
    }

    /// Set the value for a key with zero cost
    pub fn set(&self, key: K, value: V) {
        self.set_with_cost(key, value, 0);
    }

    /// Set the value for a key, associating the entry with a cost
    ///
    /// An existing entry keeps its node: the value and cost are replaced,
    /// the access time refreshed, and the entry promoted to the
    /// most-recently-used position. If the new aggregates exceed the count
    /// or cost limit, an asynchronous trim is scheduled; the call itself
    /// never blocks on eviction.
    pub fn set_with_cost(&self, key: K, value: V, cost: usize) {
        let now = self.shared.clock.now();
        let displaced = {
            let mut map = self.shared.map.lock().unwrap();
            let displaced = match map.handle(&key) {
                Some(handle) => map.replace_value(handle, value, cost, now),
                None => {
                    map.insert_at_head(key, value, cost, now);
                    None
                }
            };
            let config = &self.shared.config;
            let over_count = config.count_limit.is_some_and(|limit| map.len() > limit);
            let over_cost = config.cost_limit.is_some_and(|limit| map.total_cost() > limit);
            if over_count || over_cost {
                self.poke_trimmer();
            }
            displaced
        };
        if self.shared.config.track_metrics {
            self.shared.metrics.record_insert();
        }
        if let Some(old) = displaced {
            self.shared.releaser.release(vec![old]);
        }
    }

    /// Remove a key, returning its value to the caller
    pub fn remove(&self, key: &K) -> Option<V> {
        let node = {
            let mut map = self.shared.map.lock().unwrap();
            map.handle(key).and_then(|handle| map.remove(handle))
        };
        node.map(|node| node.value)
    }

    /// Empty the cache immediately
    ///
    /// Values are released according to the release policy, outside the
    /// cache lock.
    pub fn remove_all(&self) {
        let nodes = {
            let mut map = self.shared.map.lock().unwrap();
            map.remove_all()
        };
        if self.shared.config.track_metrics {
            self.shared.metrics.reset();
        }
        self.shared.releaser.release(nodes);
    }

    /// Evict least-recently-used entries until `total_count() <= count`
    pub fn trim_to_count(&self, count: usize) {
        self.shared.trim_to_count(count);
    }

    /// Evict least-recently-used entries until `total_cost() <= cost`
    pub fn trim_to_cost(&self, cost: usize) {
        self.shared.trim_to_cost(cost);
    }

    /// Evict entries whose last access is older than `age`
    pub fn trim_to_age(&self, age: Duration) {
        self.shared.trim_to_age(age);
    }

    /// Number of entries in the cache
    pub fn total_count(&self) -> usize {
        self.shared.map.lock().unwrap().len()
    }

    /// Total cost of entries in the cache
    pub fn total_cost(&self) -> usize {
        self.shared.map.lock().unwrap().total_cost()
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let (count, cost) = {
            let map = self.shared.map.lock().unwrap();
            (map.len(), map.total_cost())
        };
        self.shared.metrics.snapshot(count, cost)
    }

    /// Host-supplied memory-pressure trigger
    ///
    /// Invokes the configured callback, then empties the cache when
    /// `remove_all_on_memory_pressure` is set. The cache never generates
    /// this event itself; host glue calls it.
    pub fn on_memory_pressure(&self) {
        if let Some(callback) = &self.shared.config.memory_pressure_callback {
            callback();
        }
        if self.shared.config.remove_all_on_memory_pressure {
            debug!("memory pressure: removing all entries");
            self.remove_all();
        }
    }

    /// Host-supplied enter-background trigger
    ///
    /// Invokes the configured callback, then empties the cache when
    /// `remove_all_on_enter_background` is set.
    pub fn on_enter_background(&self) {
        if let Some(callback) = &self.shared.config.enter_background_callback {
            callback();
        }
        if self.shared.config.remove_all_on_enter_background {
            debug!("entering background: removing all entries");
            self.remove_all();
        }
    }

    fn poke_trimmer(&self) {
        if let Some(signal) = &self.trim_signal {
            let _ = signal.send(());
        }
    }
}

impl<K, V, C> Drop for MemoryCache<K, V, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    fn drop(&mut self) {
        // Disconnecting the channel wakes the trimmer immediately; it may
        // finish one in-flight pass before exiting.
        self.trim_signal.take();
        if let Some(handle) = self.trimmer.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the periodic trim worker.
///
/// The worker wakes on every `auto_trim_interval` tick and on explicit
/// signals from over-limit `set` calls, then runs the count/cost/age checks.
/// It holds only a weak reference, so dropping the cache ends the loop.
fn spawn_trimmer<K, V, C>(
    shared: Weak<Shared<K, V, C>>,
) -> (Option<Sender<()>>, Option<JoinHandle<()>>)
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
    C: Clock,
{
    let interval = match shared.upgrade() {
        Some(shared) => shared.config.auto_trim_interval,
        None => return (None, None),
    };
    let (tx, rx) = mpsc::channel::<()>();
    let spawned = thread::Builder::new().name("strata-mem-trim".into()).spawn(move || loop {
        let signal = if interval.is_zero() {
            // Periodic checks disabled; react to explicit signals only.
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(interval)
        };
        match signal {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        match shared.upgrade() {
            Some(shared) => shared.trim_all(),
            None => break,
        }
    });
    match spawned {
        Ok(handle) => (Some(tx), Some(handle)),
        Err(e) => {
            warn!("failed to spawn trim worker: {}", e);
            (None, None)
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for memory::core.
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::time::MockClock;

    fn count_limited(limit: usize) -> MemoryCache<String, i32> {
        MemoryCache::new(MemoryCacheConfig::count_limited(limit))
    }

    /// Validates `MemoryCache::new` behavior for the empty cache scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.total_count()` equals `0`.
    /// - Confirms `cache.total_cost()` equals `0`.
    #[test]
    fn test_cache_new() {
        let cache: MemoryCache<String, i32> = MemoryCache::new(MemoryCacheConfig::default());
        assert_eq!(cache.total_count(), 0);
        assert_eq!(cache.total_cost(), 0);
    }

    /// Validates `MemoryCache::set` behavior for the set and get scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.get(&"key1".to_string())` equals `Some(42)`.
    /// - Confirms `cache.get(&"key3".to_string())` equals `None`.
    /// - Confirms `cache.total_count()` equals `2`.
    #[test]
    fn test_cache_set_and_get() {
        let cache = count_limited(10);

        cache.set("key1".to_string(), 42);
        cache.set("key2".to_string(), 84);

        assert_eq!(cache.get(&"key1".to_string()), Some(42));
        assert_eq!(cache.get(&"key2".to_string()), Some(84));
        assert_eq!(cache.get(&"key3".to_string()), None);
        assert_eq!(cache.total_count(), 2);
    }

    /// Validates `MemoryCache::set_with_cost` behavior for the cost
    /// accounting scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.total_cost()` equals `30` after two inserts.
    /// - Confirms updating an entry adjusts the aggregate by the delta.
    #[test]
    fn test_cache_cost_accounting() {
        let cache = count_limited(10);

        cache.set_with_cost("a".to_string(), 1, 10);
        cache.set_with_cost("b".to_string(), 2, 20);
        assert_eq!(cache.total_cost(), 30);

        cache.set_with_cost("a".to_string(), 3, 25);
        assert_eq!(cache.total_cost(), 45);
        assert_eq!(cache.total_count(), 2);
    }

    /// Validates `MemoryCache::set` behavior for the update existing
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the second set replaces the value without growing the
    ///   cache.
    #[test]
    fn test_cache_update_existing() {
        let cache = count_limited(10);

        cache.set("key".to_string(), 42);
        cache.set("key".to_string(), 84);

        assert_eq!(cache.get(&"key".to_string()), Some(84));
        assert_eq!(cache.total_count(), 1);
    }

    /// Validates `MemoryCache::remove` behavior for the removal scenario.
    ///
    /// Assertions:
    /// - Confirms `removed` equals `Some(42)`.
    /// - Confirms the key is gone afterwards.
    #[test]
    fn test_cache_remove() {
        let cache = count_limited(10);

        cache.set_with_cost("key".to_string(), 42, 7);
        let removed = cache.remove(&"key".to_string());

        assert_eq!(removed, Some(42));
        assert_eq!(cache.total_count(), 0);
        assert_eq!(cache.total_cost(), 0);
        assert_eq!(cache.get(&"key".to_string()), None);
    }

    /// Validates `MemoryCache::remove_all` behavior for the clear scenario.
    ///
    /// Assertions:
    /// - Confirms count and cost read zero after the clear.
    #[test]
    fn test_cache_remove_all() {
        let cache = count_limited(10);

        cache.set_with_cost("key1".to_string(), 1, 5);
        cache.set_with_cost("key2".to_string(), 2, 5);

        cache.remove_all();

        assert_eq!(cache.total_count(), 0);
        assert_eq!(cache.total_cost(), 0);
    }

    /// Validates `MemoryCache::contains` behavior for the membership
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a contained key reports true without becoming
    ///   most-recently-used.
    #[test]
    fn test_cache_contains_does_not_promote() {
        let cache = count_limited(10);

        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        assert!(cache.contains(&"a".to_string()));

        // "a" stayed least-recently-used, so a trim to one entry evicts it.
        cache.trim_to_count(1);
        assert!(!cache.contains(&"a".to_string()));
        assert!(cache.contains(&"b".to_string()));
    }

    /// Validates `MemoryCache::trim_to_count` behavior for the LRU order
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the least-recently-used entries are evicted first.
    /// - Confirms a get refreshes an entry's position.
    #[test]
    fn test_trim_to_count_lru_order() {
        let cache = count_limited(10);

        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.set("c".to_string(), 3);

        // Promote "a"; "b" becomes the LRU entry.
        let _ = cache.get(&"a".to_string());

        cache.trim_to_count(2);

        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    /// Validates `MemoryCache::trim_to_cost` behavior for the cost budget
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms eviction stops once the aggregate is within budget.
    #[test]
    fn test_trim_to_cost() {
        let cache = count_limited(10);

        cache.set_with_cost("a".to_string(), 1, 10);
        cache.set_with_cost("b".to_string(), 2, 10);
        cache.set_with_cost("c".to_string(), 3, 10);

        cache.trim_to_cost(15);

        assert!(cache.total_cost() <= 15);
        assert_eq!(cache.get(&"c".to_string()), Some(3));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    /// Validates `MemoryCache::trim_to_age` behavior with a mock clock.
    ///
    /// Assertions:
    /// - Confirms entries older than the age survive until time advances.
    /// - Confirms a recently accessed entry outlives the trim.
    #[test]
    fn test_trim_to_age_with_mock_clock() {
        let clock = MockClock::new();
        let cache: MemoryCache<String, i32, MockClock> =
            MemoryCache::with_clock(MemoryCacheConfig::default(), clock.clone());

        cache.set("old".to_string(), 1);
        clock.advance(Duration::from_secs(30));
        cache.set("new".to_string(), 2);

        cache.trim_to_age(Duration::from_secs(10));

        assert_eq!(cache.get(&"old".to_string()), None);
        assert_eq!(cache.get(&"new".to_string()), Some(2));
    }

    /// Validates the asynchronous trim scheduled by an over-limit set.
    ///
    /// Assertions:
    /// - Confirms the background worker brings the cache back within the
    ///   count limit.
    #[test]
    fn test_over_limit_set_schedules_trim() {
        let config = MemoryCacheConfig::builder()
            .count_limit(2)
            .auto_trim_interval(Duration::from_millis(20))
            .build();
        let cache: MemoryCache<String, i32> = MemoryCache::new(config);

        for i in 0..6 {
            cache.set(format!("key{}", i), i);
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while cache.total_count() > 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(cache.total_count() <= 2);
    }

    /// Validates `MemoryCache::stats` behavior for the metrics tracking
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms hits, misses, inserts, and gauges in the snapshot.
    #[test]
    fn test_cache_stats_tracking() {
        let config = MemoryCacheConfig::builder().count_limit(10).track_metrics(true).build();
        let cache: MemoryCache<String, i32> = MemoryCache::new(config);

        cache.set_with_cost("key1".to_string(), 1, 4);
        cache.set_with_cost("key2".to_string(), 2, 6);

        let _ = cache.get(&"key1".to_string()); // Hit
        let _ = cache.get(&"key1".to_string()); // Hit
        let _ = cache.get(&"key3".to_string()); // Miss

        let stats = cache.stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.cost, 10);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 2);
        assert_eq!(stats.hit_rate(), 2.0 / 3.0);
    }

    /// Validates `MemoryCache::on_memory_pressure` behavior.
    ///
    /// Assertions:
    /// - Confirms the callback fires and the cache is emptied.
    #[test]
    fn test_on_memory_pressure() {
        let fired = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&fired);
        let config = MemoryCacheConfig::builder()
            .on_memory_pressure(move || {
                probe.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let cache: MemoryCache<String, i32> = MemoryCache::new(config);

        cache.set("key".to_string(), 1);
        cache.on_memory_pressure();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(cache.total_count(), 0);
    }

    /// Validates `MemoryCache::on_enter_background` behavior with the
    /// remove-all knob disabled.
    ///
    /// Assertions:
    /// - Confirms the callback fires while entries survive.
    #[test]
    fn test_on_enter_background_keeps_entries_when_disabled() {
        let fired = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&fired);
        let config = MemoryCacheConfig::builder()
            .remove_all_on_enter_background(false)
            .on_enter_background(move || {
                probe.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let cache: MemoryCache<String, i32> = MemoryCache::new(config);

        cache.set("key".to_string(), 1);
        cache.on_enter_background();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(cache.total_count(), 1);
    }

    /// Validates `MemoryCache` behavior for the thread safety scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.total_count()` equals `100` after concurrent
    ///   inserts.
    #[test]
    fn test_cache_thread_safety() {
        let cache = Arc::new(count_limited(1000));
        let mut handles = vec![];

        for i in 0..10 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for j in 0..10 {
                    cache.set(format!("key-{}-{}", i, j), i * 10 + j);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.total_count(), 100);
    }
}
