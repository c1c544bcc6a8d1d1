//! Global hit/miss/eviction counters, gated at runtime.
//!
//! Counters are plain relaxed atomics and are only touched when the cache
//! was built with `collect_stats: true`; a disabled cache pays a single
//! branch per operation and [`Stats`] reads back as zeros.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counter block; the façade and every shard hold the same instance.
#[derive(Debug)]
pub(crate) struct CacheCounters {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        if self.enabled {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        if self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_eviction(&self) {
        if self.enabled {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time cache statistics, returned by
/// [`CloxCache::stats`](crate::cache::CloxCache::stats).
///
/// # Example
///
/// ```
/// use cloxcache::cache::{CloxCache, Config};
///
/// let cache: CloxCache<&str> = CloxCache::new(Config {
///     num_shards: 8,
///     slots_per_shard: 64,
///     collect_stats: true,
///     ..Config::default()
/// })
/// .unwrap();
///
/// cache.put("k1", "v1");
/// cache.get("k1");
/// cache.get("absent");
///
/// let stats = cache.stats();
/// assert_eq!(stats.hits, 1);
/// assert_eq!(stats.misses, 1);
/// assert_eq!(stats.hit_rate(), 0.5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries unlinked by the eviction scanner.
    pub evictions: u64,
}

impl Stats {
    /// Hits over total lookups; `0.0` when no lookups were recorded.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits: {}, misses: {}, hit_rate: {:.2}%, evictions: {}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions
        )
    }
}
