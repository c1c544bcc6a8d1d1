//! Fluent builder for cache construction.
//!
//! A thin layer over [`Config`] for callers who prefer chained setters to
//! struct literals.
//!
//! ## Example
//!
//! ```rust
//! use cloxcache::builder::CacheBuilder;
//!
//! let cache = CacheBuilder::new()
//!     .num_shards(8)
//!     .slots_per_shard(64)
//!     .capacity(256)
//!     .collect_stats(true)
//!     .try_build::<String>()
//!     .unwrap();
//!
//! cache.put("greeting", "hello".to_string());
//! assert_eq!(cache.get("greeting"), Some("hello".to_string()));
//! ```

use crate::cache::{CloxCache, Config};
use crate::error::ConfigError;

/// Builder for [`CloxCache`] instances.
#[derive(Debug, Clone, Default)]
pub struct CacheBuilder {
    config: Config,
}

impl CacheBuilder {
    /// Starts from the default configuration (16 shards, 256 slots each,
    /// capacity equal to the slot budget, stats off).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shard count. Must be a positive power of two.
    pub fn num_shards(mut self, num_shards: usize) -> Self {
        self.config.num_shards = num_shards;
        self
    }

    /// Sets the slots per shard. Must be a positive power of two.
    pub fn slots_per_shard(mut self, slots_per_shard: usize) -> Self {
        self.config.slots_per_shard = slots_per_shard;
        self
    }

    /// Sets the total live-entry budget. `0` selects
    /// `num_shards * slots_per_shard`.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Enables or disables global hit/miss/eviction counters.
    pub fn collect_stats(mut self, collect_stats: bool) -> Self {
        self.config.collect_stats = collect_stats;
        self
    }

    /// Sets the eviction sweep percentage, clamped to `[1, 100]` at build
    /// time. `0` selects the default of 15.
    pub fn sweep_percent(mut self, sweep_percent: u32) -> Self {
        self.config.sweep_percent = sweep_percent;
        self
    }

    /// Validates the configuration and builds the cache.
    ///
    /// # Example
    ///
    /// ```
    /// use cloxcache::builder::CacheBuilder;
    ///
    /// let err = CacheBuilder::new()
    ///     .num_shards(3)
    ///     .try_build::<u64>()
    ///     .unwrap_err();
    /// assert!(err.to_string().contains("num_shards"));
    /// ```
    pub fn try_build<V>(self) -> Result<CloxCache<V>, ConfigError>
    where
        V: Clone + Send + Sync + 'static,
    {
        CloxCache::new(self.config)
    }
}
