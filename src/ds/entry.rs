//! Cache entry node: immutable key copy plus atomic metadata.
//!
//! One node exists per live or ghost key. Nodes are pinned by identity: once
//! linked into a collision chain they are never moved or copied, only
//! unlinked and reclaimed after all concurrent readers have retired.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       EntryNode<V>                           │
//! │                                                              │
//! │   value: Atomic<V>          swapped on overwrite, epoch-     │
//! │                             reclaimed                        │
//! │   next: Atomic<EntryNode>   chain link, structural writes    │
//! │                             only under the shard mutex       │
//! │   key_hash: u64             cached, fast inequality filter   │
//! │   freq: AtomicI32           [1, 15] live / [-15, -1] ghost   │
//! │   last_access: AtomicU64    shard logical clock stamp        │
//! │   key: Box<[u8]>            owned copy, immutable            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Frequency encoding
//!
//! The sign bit of `freq` doubles as the live/ghost state: a positive value
//! is a live entry's access frequency, a negative value is a ghost's
//! remembered frequency at demotion. Zero is never stored, so every
//! transition between the two states is a single atomic store and no
//! intermediate value is observable.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use crossbeam_epoch::{Atomic, Guard};

/// Saturation point for the access-frequency counter.
pub(crate) const MAX_FREQUENCY: i32 = 15;

/// Frequency assigned to a freshly inserted key.
pub(crate) const INITIAL_FREQ: i32 = 1;

/// A single cache entry, live or ghost, linked into a collision chain.
pub(crate) struct EntryNode<V> {
    value: Atomic<V>,
    /// Next entry in the same chain. Readers follow it with acquire loads;
    /// only the shard mutex holder stores to it.
    pub(crate) next: Atomic<EntryNode<V>>,
    /// Cached 64-bit hash of `key`, compared before the byte comparison.
    pub(crate) key_hash: u64,
    /// Signed frequency: `[1, 15]` live, `[-15, -1]` ghost, never zero.
    pub(crate) freq: AtomicI32,
    /// Logical timestamp of the last recorded access, minted from the owning
    /// shard's clock. Sole basis for LRU tiebreaking.
    pub(crate) last_access: AtomicU64,
    key: Box<[u8]>,
}

impl<V> EntryNode<V> {
    /// Creates a live node owning a private copy of `key`.
    pub(crate) fn new(key: &[u8], key_hash: u64, value: V, timestamp: u64) -> Self {
        Self {
            value: Atomic::new(value),
            next: Atomic::null(),
            key_hash,
            freq: AtomicI32::new(INITIAL_FREQ),
            last_access: AtomicU64::new(timestamp),
            key: key.to_vec().into_boxed_slice(),
        }
    }

    /// Length-then-bytes equality against a candidate key.
    #[inline]
    pub(crate) fn key_matches(&self, key: &[u8]) -> bool {
        self.key.len() == key.len() && *self.key == *key
    }

    /// Loads the current value. The clone happens inside the guard's
    /// lifetime, so the underlying allocation cannot be reclaimed mid-read.
    #[inline]
    pub(crate) fn load_value(&self, guard: &Guard) -> V
    where
        V: Clone,
    {
        let shared = self.value.load(Ordering::Acquire, guard);
        // A node always carries a value from construction to destruction.
        unsafe { shared.deref() }.clone()
    }

    /// Replaces the value, deferring destruction of the previous one until
    /// all concurrent readers have retired.
    pub(crate) fn store_value(&self, value: V, guard: &Guard) {
        let old = self
            .value
            .swap(crossbeam_epoch::Owned::new(value), Ordering::AcqRel, guard);
        unsafe { guard.defer_destroy(old) };
    }

    /// Best-effort saturating frequency bump for a live node.
    ///
    /// Stops at [`MAX_FREQUENCY`] and backs off if the node turns ghost
    /// underneath us. A lost CAS race is retried; this runs on the write
    /// path where the extra loop is cheap.
    pub(crate) fn bump_freq_saturating(&self) {
        let mut freq = self.freq.load(Ordering::Relaxed);
        while freq > 0 && freq < MAX_FREQUENCY {
            match self.freq.compare_exchange_weak(
                freq,
                freq + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => freq = current,
            }
        }
    }
}

impl<V> Drop for EntryNode<V> {
    fn drop(&mut self) {
        // The node is no longer reachable: either it was unlinked and the
        // epoch collector retired every reader, or the whole slot array is
        // being torn down.
        unsafe {
            let guard = crossbeam_epoch::unprotected();
            let value = self.value.load(Ordering::Relaxed, guard);
            if !value.is_null() {
                drop(value.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_starts_live_at_initial_freq() {
        let node = EntryNode::new(b"key", 0xABCD, 7u64, 1);
        assert_eq!(node.freq.load(Ordering::Relaxed), INITIAL_FREQ);
        assert_eq!(node.last_access.load(Ordering::Relaxed), 1);
        assert_eq!(node.key_hash, 0xABCD);
    }

    #[test]
    fn key_matches_compares_length_then_bytes() {
        let node = EntryNode::new(b"abc", 1, 0u32, 0);
        assert!(node.key_matches(b"abc"));
        assert!(!node.key_matches(b"ab"));
        assert!(!node.key_matches(b"abd"));
        assert!(!node.key_matches(b"abcd"));
    }

    #[test]
    fn key_is_a_private_copy() {
        let mut caller_buf = b"mutable".to_vec();
        let node = EntryNode::new(&caller_buf, 1, 0u32, 0);
        caller_buf[0] = b'X';
        assert!(node.key_matches(b"mutable"));
        assert!(!node.key_matches(&caller_buf));
    }

    #[test]
    fn load_and_store_value_roundtrip() {
        let guard = crossbeam_epoch::pin();
        let node = EntryNode::new(b"k", 1, "first".to_string(), 0);
        assert_eq!(node.load_value(&guard), "first");
        node.store_value("second".to_string(), &guard);
        assert_eq!(node.load_value(&guard), "second");
    }

    #[test]
    fn bump_saturates_at_max_frequency() {
        let node = EntryNode::new(b"k", 1, 0u32, 0);
        for _ in 0..100 {
            node.bump_freq_saturating();
        }
        assert_eq!(node.freq.load(Ordering::Relaxed), MAX_FREQUENCY);
    }

    #[test]
    fn bump_leaves_ghosts_untouched() {
        let node = EntryNode::new(b"k", 1, 0u32, 0);
        node.freq.store(-3, Ordering::Relaxed);
        node.bump_freq_saturating();
        assert_eq!(node.freq.load(Ordering::Relaxed), -3);
    }
}
