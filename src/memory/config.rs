//! Memory-cache configuration types and builder patterns

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Hook invoked by a lifecycle entry point (`on_memory_pressure`,
/// `on_enter_background`).
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Dispatcher that runs a closure on the host's main/UI thread.
///
/// Some embedded objects must be destroyed on a specific thread; when
/// `release_on_main_thread` is set, evicted values are handed to this
/// dispatcher instead of the background release worker. The host integration
/// installs it; the cache never assumes which thread is "main".
pub type MainThreadDispatcher = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Configuration for [`MemoryCache`](super::MemoryCache) behavior
///
/// Limits are best-effort: an over-limit cache is brought back within budget
/// by the background trimmer, not synchronously on the offending call.
#[derive(Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries (None = unlimited)
    pub count_limit: Option<usize>,

    /// Maximum total cost of entries (None = unlimited)
    pub cost_limit: Option<usize>,

    /// Maximum age of entries since last access (None = unlimited)
    pub age_limit: Option<Duration>,

    /// Interval between background limit checks (default: 5 s)
    pub auto_trim_interval: Duration,

    /// Empty the cache when `on_memory_pressure` fires (default: true)
    pub remove_all_on_memory_pressure: bool,

    /// Empty the cache when `on_enter_background` fires (default: true)
    pub remove_all_on_enter_background: bool,

    /// Release evicted values on a background worker instead of the calling
    /// thread (default: true)
    pub release_async: bool,

    /// Release evicted values via the main-thread dispatcher (default: false)
    ///
    /// Requires `main_thread_dispatcher`; without one, release falls back to
    /// the background worker.
    pub release_on_main_thread: bool,

    /// Whether to collect hit/miss/eviction metrics (default: false)
    pub track_metrics: bool,

    /// Dispatcher used when `release_on_main_thread` is set
    pub main_thread_dispatcher: Option<MainThreadDispatcher>,

    /// Hook invoked by `on_memory_pressure`
    pub memory_pressure_callback: Option<LifecycleCallback>,

    /// Hook invoked by `on_enter_background`
    pub enter_background_callback: Option<LifecycleCallback>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            count_limit: None,
            cost_limit: None,
            age_limit: None,
            auto_trim_interval: Duration::from_secs(5),
            remove_all_on_memory_pressure: true,
            remove_all_on_enter_background: true,
            release_async: true,
            release_on_main_thread: false,
            track_metrics: false,
            main_thread_dispatcher: None,
            memory_pressure_callback: None,
            enter_background_callback: None,
        }
    }
}

impl fmt::Debug for MemoryCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheConfig")
            .field("count_limit", &self.count_limit)
            .field("cost_limit", &self.cost_limit)
            .field("age_limit", &self.age_limit)
            .field("auto_trim_interval", &self.auto_trim_interval)
            .field("remove_all_on_memory_pressure", &self.remove_all_on_memory_pressure)
            .field("remove_all_on_enter_background", &self.remove_all_on_enter_background)
            .field("release_async", &self.release_async)
            .field("release_on_main_thread", &self.release_on_main_thread)
            .field("track_metrics", &self.track_metrics)
            .field("main_thread_dispatcher", &self.main_thread_dispatcher.is_some())
            .field("memory_pressure_callback", &self.memory_pressure_callback.is_some())
            .field("enter_background_callback", &self.enter_background_callback.is_some())
            .finish()
    }
}

impl MemoryCacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> MemoryCacheConfigBuilder {
        MemoryCacheConfigBuilder::default()
    }

    /// Quick preset limiting the number of entries
    ///
    /// # Example
    /// ```
    /// use strata_cache::MemoryCacheConfig;
    ///
    /// let config = MemoryCacheConfig::count_limited(10_000);
    /// ```
    pub fn count_limited(count: usize) -> Self {
        Self { count_limit: Some(count), ..Default::default() }
    }

    /// Quick preset limiting the total cost of entries
    ///
    /// # Example
    /// ```
    /// use strata_cache::MemoryCacheConfig;
    ///
    /// let config = MemoryCacheConfig::cost_limited(64 * 1024 * 1024);
    /// ```
    pub fn cost_limited(cost: usize) -> Self {
        Self { cost_limit: Some(cost), ..Default::default() }
    }
}

/// Builder for [`MemoryCacheConfig`] with fluent API
#[derive(Default)]
pub struct MemoryCacheConfigBuilder {
    config: MemoryCacheConfig,
}

impl MemoryCacheConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries
    pub fn count_limit(mut self, count: usize) -> Self {
        self.config.count_limit = Some(count);
        self
    }

    /// Set the maximum total cost
    pub fn cost_limit(mut self, cost: usize) -> Self {
        self.config.cost_limit = Some(cost);
        self
    }

    /// Set the maximum entry age
    pub fn age_limit(mut self, age: Duration) -> Self {
        self.config.age_limit = Some(age);
        self
    }

    /// Set the background trim interval
    pub fn auto_trim_interval(mut self, interval: Duration) -> Self {
        self.config.auto_trim_interval = interval;
        self
    }

    /// Empty the cache on memory-pressure notifications
    pub fn remove_all_on_memory_pressure(mut self, enabled: bool) -> Self {
        self.config.remove_all_on_memory_pressure = enabled;
        self
    }

    /// Empty the cache on enter-background notifications
    pub fn remove_all_on_enter_background(mut self, enabled: bool) -> Self {
        self.config.remove_all_on_enter_background = enabled;
        self
    }

    /// Release evicted values asynchronously
    pub fn release_async(mut self, enabled: bool) -> Self {
        self.config.release_async = enabled;
        self
    }

    /// Release evicted values on the main thread
    pub fn release_on_main_thread(mut self, enabled: bool) -> Self {
        self.config.release_on_main_thread = enabled;
        self
    }

    /// Enable or disable metrics tracking
    pub fn track_metrics(mut self, enabled: bool) -> Self {
        self.config.track_metrics = enabled;
        self
    }

    /// Install the main-thread dispatcher
    pub fn main_thread_dispatcher(
        mut self,
        dispatcher: impl Fn(Box<dyn FnOnce() + Send>) + Send + Sync + 'static,
    ) -> Self {
        self.config.main_thread_dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Install the memory-pressure hook
    pub fn on_memory_pressure(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.config.memory_pressure_callback = Some(Arc::new(callback));
        self
    }

    /// Install the enter-background hook
    pub fn on_enter_background(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.config.enter_background_callback = Some(Arc::new(callback));
        self
    }

    /// Build the configuration
    pub fn build(self) -> MemoryCacheConfig {
        self.config
    }
}
