//! Public cache façade: configuration, shard routing, and statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        CloxCache<V>                                │
//! │                                                                    │
//! │   key ──► FxHasher ──► 64-bit hash                                 │
//! │                          │                                         │
//! │          low bits ───────┤────────── next bits                     │
//! │               │                          │                         │
//! │               ▼                          ▼                         │
//! │   ┌────────┬────────┬─ ─ ─┬────────┐   slot within shard          │
//! │   │ shard 0│ shard 1│     │ shard N│                               │
//! │   └────────┴────────┴─ ─ ─┴────────┘                               │
//! │                                                                    │
//! │   Shards are fully independent: separate slots, mutex, counters,   │
//! │   logical clock, and adaptive state. No cross-shard coordination.  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency guarantees
//!
//! - `get` is lock-free: it never blocks, never takes a mutex, and never
//!   allocates.
//! - `put` takes exactly one mutex (the owning shard's) and holds it across
//!   the eviction scan; contention is bounded per shard.
//! - Per-key linearizability: a `get` that observes a completed `put` for
//!   the same key returns that value or a later overwrite, never an older
//!   one.

use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::adaptive::AdaptiveShardSnapshot;
use crate::error::{ConfigError, InvariantError};
use crate::metrics::{CacheCounters, Stats};
use crate::shard::Shard;
use crate::traits::BytesKey;

/// Default sweep percentage when the configured value is zero.
const DEFAULT_SWEEP_PERCENT: u32 = 15;

/// Cache construction parameters.
///
/// `num_shards` and `slots_per_shard` must be positive powers of two;
/// everything else is coerced into a usable range.
///
/// # Example
///
/// ```
/// use cloxcache::cache::{CloxCache, Config};
///
/// let cache: CloxCache<String> = CloxCache::new(Config {
///     num_shards: 4,
///     slots_per_shard: 64,
///     capacity: 128,
///     ..Config::default()
/// })
/// .unwrap();
/// assert_eq!(cache.capacity(), 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of independent partitions. Must be a positive power of two.
    pub num_shards: usize,
    /// Collision-chain slots per shard. Must be a positive power of two.
    pub slots_per_shard: usize,
    /// Total live-entry budget across all shards, distributed evenly
    /// (floor, minimum one per shard). `0` selects
    /// `num_shards * slots_per_shard`.
    pub capacity: usize,
    /// Maintain global hit/miss/eviction counters.
    pub collect_stats: bool,
    /// Percentage of a shard's slots inspected per eviction call, clamped
    /// to `[1, 100]`. `0` selects the default of 15.
    pub sweep_percent: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_shards: 16,
            slots_per_shard: 256,
            capacity: 0,
            collect_stats: false,
            sweep_percent: DEFAULT_SWEEP_PERCENT,
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_shards == 0 || !self.num_shards.is_power_of_two() {
            return Err(ConfigError::new(format!(
                "num_shards must be a positive power of two, got {}",
                self.num_shards
            )));
        }
        if self.slots_per_shard == 0 || !self.slots_per_shard.is_power_of_two() {
            return Err(ConfigError::new(format!(
                "slots_per_shard must be a positive power of two, got {}",
                self.slots_per_shard
            )));
        }
        Ok(())
    }
}

/// Concurrent, bounded, in-memory key-value cache.
///
/// Lookups are lock-free; inserts serialize only against writers of the
/// same shard. Values are cloned out on `get`; use `Arc<T>` as the value
/// type to make that an O(1) reference-count bump.
///
/// # Example
///
/// ```
/// use cloxcache::cache::{CloxCache, Config};
///
/// let cache: CloxCache<i32> = CloxCache::new(Config {
///     num_shards: 4,
///     slots_per_shard: 16,
///     ..Config::default()
/// })
/// .unwrap();
///
/// assert!(cache.put("answer", 42));
/// assert_eq!(cache.get("answer"), Some(42));
/// assert_eq!(cache.get("question"), None);
///
/// // Text and binary keys share one identity.
/// assert_eq!(cache.get(b"answer".as_slice()), Some(42));
/// ```
pub struct CloxCache<V> {
    shards: Box<[Shard<V>]>,
    shard_mask: u64,
    per_shard_capacity: usize,
    counters: Arc<CacheCounters>,
    closed: AtomicBool,
}

impl<V> CloxCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Builds a cache from `config`.
    ///
    /// Fails when `num_shards` or `slots_per_shard` is not a positive power
    /// of two; the error message names the offending field.
    ///
    /// # Example
    ///
    /// ```
    /// use cloxcache::cache::{CloxCache, Config};
    ///
    /// let err = CloxCache::<u64>::new(Config {
    ///     num_shards: 12,
    ///     ..Config::default()
    /// })
    /// .unwrap_err();
    /// assert!(err.to_string().contains("num_shards"));
    /// ```
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let total_capacity = if config.capacity == 0 {
            config.num_shards * config.slots_per_shard
        } else {
            config.capacity
        };
        let per_shard_capacity = (total_capacity / config.num_shards).max(1);
        let ghost_capacity = config
            .slots_per_shard
            .saturating_sub(per_shard_capacity)
            .min(per_shard_capacity);
        let sweep_percent = if config.sweep_percent == 0 {
            DEFAULT_SWEEP_PERCENT
        } else {
            config.sweep_percent.min(100)
        };
        let shard_bits = config.num_shards.trailing_zeros();

        let counters = Arc::new(CacheCounters::new(config.collect_stats));
        let shards = (0..config.num_shards)
            .map(|_| {
                Shard::new(
                    config.slots_per_shard,
                    shard_bits,
                    per_shard_capacity,
                    ghost_capacity,
                    sweep_percent,
                    Arc::clone(&counters),
                )
            })
            .collect::<Vec<_>>();

        Ok(Self {
            shards: shards.into_boxed_slice(),
            shard_mask: (config.num_shards - 1) as u64,
            per_shard_capacity,
            counters,
            closed: AtomicBool::new(false),
        })
    }

    /// Looks up `key`, returning a clone of the last stored value.
    ///
    /// Lock-free: never blocks and never allocates. A hit bumps the entry's
    /// frequency (saturating at the ceiling) and refreshes its recency
    /// stamp.
    ///
    /// # Example
    ///
    /// ```
    /// use cloxcache::cache::{CloxCache, Config};
    ///
    /// let cache: CloxCache<&str> = CloxCache::new(Config::default()).unwrap();
    /// cache.put("k", "v");
    /// assert_eq!(cache.get("k"), Some("v"));
    /// assert_eq!(cache.get("missing"), None);
    /// ```
    pub fn get<K>(&self, key: &K) -> Option<V>
    where
        K: BytesKey + ?Sized,
    {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let bytes = key.key_bytes();
        let hash = hash_key(bytes);
        let shard = &self.shards[(hash & self.shard_mask) as usize];

        let guard = crossbeam_epoch::pin();
        let result = shard.get(bytes, hash, &guard);
        match result {
            Some(_) => self.counters.record_hit(),
            None => self.counters.record_miss(),
        }
        result
    }

    /// Inserts or overwrites `key`.
    ///
    /// Returns `false` only when the owning shard is at capacity and an
    /// eviction scan found nothing to remove, a transient condition; the
    /// caller may retry or drop the write. The key bytes are copied, so the
    /// caller's buffer may be reused immediately.
    ///
    /// # Example
    ///
    /// ```
    /// use cloxcache::cache::{CloxCache, Config};
    ///
    /// let cache: CloxCache<u32> = CloxCache::new(Config::default()).unwrap();
    /// assert!(cache.put("counter", 1));
    /// assert!(cache.put("counter", 2));
    /// assert_eq!(cache.get("counter"), Some(2));
    /// ```
    pub fn put<K>(&self, key: &K, value: V) -> bool
    where
        K: BytesKey + ?Sized,
    {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let bytes = key.key_bytes();
        let hash = hash_key(bytes);
        let shard = &self.shards[(hash & self.shard_mask) as usize];

        let guard = crossbeam_epoch::pin();
        shard.put(bytes, value, hash, &guard)
    }

    /// Global hit/miss/eviction counters. All zeros when the cache was
    /// built without `collect_stats`.
    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    /// Per-shard adaptive state: protection threshold, graduation rate,
    /// eviction classes, learned bands, and window hit rate.
    pub fn adaptive_stats(&self) -> Vec<AdaptiveShardSnapshot> {
        self.shards
            .iter()
            .map(|shard| shard.adaptive_snapshot())
            .collect()
    }

    /// Live entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.live_count()).sum()
    }

    /// `true` when no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Effective total capacity: the per-shard budget times the shard
    /// count. May round below the configured total.
    pub fn capacity(&self) -> usize {
        self.per_shard_capacity * self.shards.len()
    }

    /// Marks the cache closed. Idempotent; subsequent lookups miss and
    /// inserts are refused. Entry memory is released when the cache drops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Full-traversal consistency check across every shard. Intended for
    /// tests and diagnostics on a quiescent cache.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        for (index, shard) in self.shards.iter().enumerate() {
            shard
                .check_invariants()
                .map_err(|e| InvariantError::new(format!("shard {index}: {e}")))?;
        }
        Ok(())
    }
}

impl<V> std::fmt::Debug for CloxCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloxCache")
            .field("num_shards", &self.shards.len())
            .field("capacity", &(self.per_shard_capacity * self.shards.len()))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[inline]
fn hash_key(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}
