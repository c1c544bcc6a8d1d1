//! Per-shard adaptive tuning of the eviction protection threshold.
//!
//! Two coupled feedback loops run whenever an eviction checkpoint is
//! claimed, both inside the shard mutex:
//!
//! 1. **Band learning (outer loop).** Once the rolling window reaches
//!    [`HIT_RATE_WINDOW_OPS`] lookups, the observed hit rate is compared to
//!    the previous window's. If the last adaptation moved `k` and the hit
//!    rate improved, the band that allowed the move is relaxed by one
//!    learning step; if it regressed, the band is tightened. Bands are
//!    clamped to fixed ranges and may not cross out of them.
//! 2. **Threshold control (inner loop).** The graduation rate (entries
//!    whose frequency climbed past `k` under capacity pressure, divided by
//!    total evictions) is compared to the learned bands. Below the low band
//!    `k` steps down and more entries become eviction candidates; above the
//!    high band `k` steps up and more entries are protected.
//!
//! ## State machine
//!
//! ```text
//!              graduation rate < rate_low          graduation rate > rate_high
//!                     │                                     │
//!                     ▼                                     ▼
//!          ┌──────────────────┐                  ┌──────────────────┐
//!          │  k ← k − 1       │                  │  k ← k + 1       │
//!          │  direction = −1  │                  │  direction = +1  │
//!          └────────┬─────────┘                  └────────┬─────────┘
//!                   │        next full hit-rate window    │
//!                   ▼                                     ▼
//!      improved → rate_low += 0.10          improved → rate_high −= 0.10
//!      regressed → rate_low −= 0.10         regressed → rate_high += 0.10
//! ```
//!
//! All rates are carried as integers (bands in per-mille, hit rates in
//! basis points) so the controller runs entirely on atomics.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::ds::MAX_FREQUENCY;

/// Evictions between adaptation checkpoints.
pub(crate) const ADAPTIVE_CHECK_INTERVAL: u64 = 1000;

/// Lookups per hit-rate measurement window.
pub(crate) const HIT_RATE_WINDOW_OPS: u64 = 2000;

/// Band learning step: 0.10 in per-mille.
const RATE_STEP_PERMILLE: u32 = 100;

/// Clamp range for the low band: [0.05, 0.40].
const RATE_LOW_MIN: u32 = 50;
const RATE_LOW_MAX: u32 = 400;

/// Clamp range for the high band: [0.30, 0.80].
const RATE_HIGH_MIN: u32 = 300;
const RATE_HIGH_MAX: u32 = 800;

/// Graduation counters decay by halving once they exceed this.
const COUNTER_DECAY_FLOOR: u64 = 100;

/// `k` must leave headroom below the frequency ceiling.
const MAX_K: i32 = MAX_FREQUENCY - 1;

const INITIAL_K: i32 = 2;
const INITIAL_RATE_LOW: u32 = 250;
const INITIAL_RATE_HIGH: u32 = 500;

/// Adaptive controller state, one per shard.
pub(crate) struct AdaptiveState {
    k: AtomicI32,
    reached_protected: AtomicU64,
    evicted_unprotected: AtomicU64,
    evicted_protected: AtomicU64,
    last_adapt_check: AtomicU64,
    window_ops: AtomicU64,
    window_hits: AtomicU64,
    prev_hit_rate_bp: AtomicU64,
    rate_low_permille: AtomicU32,
    rate_high_permille: AtomicU32,
    last_k_direction: AtomicI32,
}

impl AdaptiveState {
    pub(crate) fn new() -> Self {
        Self {
            k: AtomicI32::new(INITIAL_K),
            reached_protected: AtomicU64::new(0),
            evicted_unprotected: AtomicU64::new(0),
            evicted_protected: AtomicU64::new(0),
            last_adapt_check: AtomicU64::new(0),
            window_ops: AtomicU64::new(0),
            window_hits: AtomicU64::new(0),
            prev_hit_rate_bp: AtomicU64::new(0),
            rate_low_permille: AtomicU32::new(INITIAL_RATE_LOW),
            rate_high_permille: AtomicU32::new(INITIAL_RATE_HIGH),
            last_k_direction: AtomicI32::new(0),
        }
    }

    /// Current protection threshold.
    #[inline]
    pub(crate) fn k(&self) -> i32 {
        self.k.load(Ordering::Relaxed)
    }

    /// Records one lookup in the rolling hit-rate window.
    #[inline]
    pub(crate) fn record_op(&self, hit: bool) {
        self.window_ops.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.window_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a graduation: an entry's frequency crossed `k` while the
    /// shard was at capacity.
    #[inline]
    pub(crate) fn record_graduation(&self) {
        self.reached_protected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one eviction of the given class and returns the running
    /// total across both classes.
    pub(crate) fn record_eviction(&self, protected: bool) -> u64 {
        let counter = if protected {
            &self.evicted_protected
        } else {
            &self.evicted_unprotected
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.evicted_unprotected.load(Ordering::Relaxed)
            + self.evicted_protected.load(Ordering::Relaxed)
    }

    /// Claims the adaptation checkpoint if enough evictions have accrued
    /// since the last claim. At most one caller wins per interval.
    pub(crate) fn try_claim_checkpoint(&self, total_evictions: u64) -> bool {
        let last = self.last_adapt_check.load(Ordering::Relaxed);
        if total_evictions.wrapping_sub(last) < ADAPTIVE_CHECK_INTERVAL {
            return false;
        }
        self.last_adapt_check
            .compare_exchange(last, total_evictions, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Runs both feedback loops. Called under the shard mutex after a
    /// claimed checkpoint.
    pub(crate) fn adapt(&self) {
        self.learn_bands();
        self.tune_k();
    }

    /// Outer loop: steers the rate bands from observed hit-rate movement.
    fn learn_bands(&self) {
        let ops = self.window_ops.load(Ordering::Relaxed);
        if ops < HIT_RATE_WINDOW_OPS {
            return;
        }
        let hits = self.window_hits.load(Ordering::Relaxed);
        let current_bp = hits.saturating_mul(10_000) / ops;
        let improved = current_bp >= self.prev_hit_rate_bp.load(Ordering::Relaxed);

        let direction = self.last_k_direction.load(Ordering::Relaxed);
        if direction > 0 {
            // We raised k last time: reward by making raises easier.
            let high = self.rate_high_permille.load(Ordering::Relaxed);
            let next = if improved {
                high.saturating_sub(RATE_STEP_PERMILLE)
            } else {
                high + RATE_STEP_PERMILLE
            };
            self.rate_high_permille
                .store(next.clamp(RATE_HIGH_MIN, RATE_HIGH_MAX), Ordering::Relaxed);
        } else if direction < 0 {
            // We lowered k last time: reward by making lowers easier.
            let low = self.rate_low_permille.load(Ordering::Relaxed);
            let next = if improved {
                low + RATE_STEP_PERMILLE
            } else {
                low.saturating_sub(RATE_STEP_PERMILLE)
            };
            self.rate_low_permille
                .store(next.clamp(RATE_LOW_MIN, RATE_LOW_MAX), Ordering::Relaxed);
        }

        self.prev_hit_rate_bp.store(current_bp, Ordering::Relaxed);
        self.window_hits.store(0, Ordering::Relaxed);
        self.window_ops.store(0, Ordering::Relaxed);
    }

    /// Inner loop: moves `k` by one step according to the graduation rate,
    /// then decays the counters toward recent behavior.
    fn tune_k(&self) {
        let reached = self.reached_protected.load(Ordering::Relaxed);
        let unprotected = self.evicted_unprotected.load(Ordering::Relaxed);
        let protected = self.evicted_protected.load(Ordering::Relaxed);
        let total = unprotected + protected;

        if total > 0 {
            let rate_permille = reached.saturating_mul(1000) / total;
            let k = self.k.load(Ordering::Relaxed);
            let direction = if rate_permille < u64::from(self.rate_low_permille.load(Ordering::Relaxed))
                && k > 1
            {
                self.k.store(k - 1, Ordering::Relaxed);
                -1
            } else if rate_permille > u64::from(self.rate_high_permille.load(Ordering::Relaxed))
                && k < MAX_K
            {
                self.k.store(k + 1, Ordering::Relaxed);
                1
            } else {
                0
            };
            self.last_k_direction.store(direction, Ordering::Relaxed);
        }

        if reached > COUNTER_DECAY_FLOOR {
            self.reached_protected.store(reached / 2, Ordering::Relaxed);
        }
        if total > COUNTER_DECAY_FLOOR {
            self.evicted_unprotected
                .store(unprotected / 2, Ordering::Relaxed);
            self.evicted_protected.store(protected / 2, Ordering::Relaxed);
        }
    }

    /// Point-in-time view, completed by the shard with its entry counts.
    pub(crate) fn snapshot(&self, live_entries: usize, ghost_entries: usize) -> AdaptiveShardSnapshot {
        let reached = self.reached_protected.load(Ordering::Relaxed);
        let unprotected = self.evicted_unprotected.load(Ordering::Relaxed);
        let protected = self.evicted_protected.load(Ordering::Relaxed);
        let total = unprotected + protected;
        let ops = self.window_ops.load(Ordering::Relaxed);
        let hits = self.window_hits.load(Ordering::Relaxed);

        AdaptiveShardSnapshot {
            k: self.k.load(Ordering::Relaxed),
            reached_protected: reached,
            evicted_unprotected: unprotected,
            evicted_protected: protected,
            graduation_rate: if total > 0 {
                reached as f64 / total as f64
            } else {
                0.0
            },
            rate_low: f64::from(self.rate_low_permille.load(Ordering::Relaxed)) / 1000.0,
            rate_high: f64::from(self.rate_high_permille.load(Ordering::Relaxed)) / 1000.0,
            window_ops: ops,
            window_hits: hits,
            window_hit_rate: if ops > 0 { hits as f64 / ops as f64 } else { 0.0 },
            live_entries,
            ghost_entries,
        }
    }
}

/// Snapshot of one shard's adaptive state, returned by
/// [`CloxCache::adaptive_stats`](crate::cache::CloxCache::adaptive_stats).
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveShardSnapshot {
    /// Current protection threshold: entries with frequency above `k` are
    /// shielded from eviction while a cheaper victim exists.
    pub k: i32,
    /// Graduations recorded since the counters last decayed.
    pub reached_protected: u64,
    /// Evictions that found a victim at or below `k`.
    pub evicted_unprotected: u64,
    /// Evictions that fell back to pure LRU among protected entries.
    pub evicted_protected: u64,
    /// `reached_protected` over total evictions.
    pub graduation_rate: f64,
    /// Learned low band; graduation rates below it lower `k`.
    pub rate_low: f64,
    /// Learned high band; graduation rates above it raise `k`.
    pub rate_high: f64,
    /// Lookups in the current (incomplete) hit-rate window.
    pub window_ops: u64,
    /// Hits in the current window.
    pub window_hits: u64,
    /// Hit rate of the current window.
    pub window_hit_rate: f64,
    /// Live entries in the shard at snapshot time.
    pub live_entries: usize,
    /// Ghost entries in the shard at snapshot time.
    pub ghost_entries: usize,
}
