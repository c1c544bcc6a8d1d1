// ==============================================
// CLOXCACHE BEHAVIORAL SCENARIOS (integration)
// ==============================================
//
// End-to-end checks of the documented cache laws: read-after-write,
// key-copy isolation, hot-key protection, configuration validation, and
// ghost revival. These span the façade and the eviction engine together.

use cloxcache::prelude::*;

// ==============================================
// Basic Operations
// ==============================================

mod basic_operations {
    use super::*;

    #[test]
    fn put_get_and_miss() {
        let cache: CloxCache<String> = CloxCache::new(Config {
            num_shards: 16,
            slots_per_shard: 256,
            ..Config::default()
        })
        .unwrap();

        assert!(cache.put("test-key", "test-value".to_string()));
        assert_eq!(cache.get("test-key"), Some("test-value".to_string()));
        assert_eq!(cache.get("non-existent"), None);
    }

    #[test]
    fn overwrites_return_the_last_value() {
        let cache: CloxCache<i64> = CloxCache::new(Config::default()).unwrap();
        cache.put("counter", 1);
        cache.put("counter", 2);
        cache.put("counter", 3);
        assert_eq!(cache.get("counter"), Some(3));
    }

    #[test]
    fn read_after_write_with_unrelated_traffic() {
        let cache: CloxCache<u64> = CloxCache::new(Config {
            num_shards: 4,
            slots_per_shard: 64,
            ..Config::default()
        })
        .unwrap();

        cache.put("target", 1);
        for i in 0..100u64 {
            cache.put(&format!("noise_{i}"), i);
        }
        cache.put("target", 2);
        for i in 0..100u64 {
            cache.get(&format!("noise_{i}"));
        }
        assert_eq!(cache.get("target"), Some(2));
    }
}

// ==============================================
// Hot-Key Protection
// ==============================================

mod hot_key_protection {
    use super::*;

    #[test]
    fn frequent_key_outlives_a_cold_fill() {
        let cache = CacheBuilder::new()
            .num_shards(4)
            .slots_per_shard(16)
            .sweep_percent(100)
            .try_build::<u64>()
            .unwrap();

        cache.put("hot", 42);
        for _ in 0..20 {
            assert_eq!(cache.get("hot"), Some(42));
        }

        for i in 0..200u64 {
            cache.put(&format!("filler_{i}"), i);
        }

        assert_eq!(cache.get("hot"), Some(42));
        cache.check_invariants().unwrap();
    }
}

// ==============================================
// Key Handling
// ==============================================

mod key_handling {
    use super::*;

    #[test]
    fn long_key_retrieved_with_a_fresh_buffer() {
        let cache: CloxCache<&str> = CloxCache::new(Config {
            num_shards: 16,
            slots_per_shard: 256,
            ..Config::default()
        })
        .unwrap();

        let stored: Vec<u8> = (0..256).map(|i| (i % 251) as u8).collect();
        assert_eq!(stored.len(), 256);
        assert!(cache.put(&stored, "long-key-value"));

        let fresh: Vec<u8> = (0..256).map(|i| (i % 251) as u8).collect();
        assert_eq!(cache.get(&fresh), Some("long-key-value"));
    }

    #[test]
    fn reused_insert_buffer_does_not_corrupt_keys() {
        let cache: CloxCache<u64> = CloxCache::new(Config {
            num_shards: 16,
            slots_per_shard: 256,
            ..Config::default()
        })
        .unwrap();

        // One mutable buffer serves every insert.
        let mut buffer = Vec::new();
        for i in 0..100u64 {
            buffer.clear();
            buffer.extend_from_slice(format!("reused-key-{i}").as_bytes());
            assert!(cache.put(&buffer, i));
        }

        // Clobber the buffer after the fact.
        buffer.clear();
        buffer.extend_from_slice(b"garbage-garbage-garbage");

        for i in 0..100u64 {
            let lookup = format!("reused-key-{i}").into_bytes();
            assert_eq!(cache.get(&lookup), Some(i), "key {i} lost or corrupted");
        }
    }

    #[test]
    fn text_and_bytes_address_the_same_entry() {
        let cache: CloxCache<u8> = CloxCache::new(Config::default()).unwrap();
        cache.put("mixed", 1);
        assert_eq!(cache.get(b"mixed".as_slice()), Some(1));
        cache.put(b"mixed".as_slice(), 2);
        assert_eq!(cache.get("mixed"), Some(2));
    }

    #[test]
    fn empty_key_is_a_valid_key() {
        let cache: CloxCache<u8> = CloxCache::new(Config::default()).unwrap();
        assert!(cache.put("", 7));
        assert_eq!(cache.get(""), Some(7));
    }
}

// ==============================================
// Configuration Validation
// ==============================================

mod config_validation {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_shapes() {
        let cases: &[(usize, usize, &str)] = &[
            (0, 256, "num_shards"),
            (15, 256, "num_shards"),
            (16, 0, "slots_per_shard"),
            (16, 255, "slots_per_shard"),
        ];
        for &(num_shards, slots_per_shard, field) in cases {
            let result = CloxCache::<u64>::new(Config {
                num_shards,
                slots_per_shard,
                ..Config::default()
            });
            let err = result.expect_err("construction must fail");
            assert!(
                err.to_string().contains(field),
                "({num_shards}, {slots_per_shard}): expected '{field}' in '{err}'"
            );
        }
    }

    #[test]
    fn accepts_single_shard_single_slot() {
        let cache: CloxCache<u8> = CloxCache::new(Config {
            num_shards: 1,
            slots_per_shard: 1,
            ..Config::default()
        })
        .unwrap();
        assert!(cache.put("only", 1));
        assert_eq!(cache.get("only"), Some(1));
    }

    #[test]
    fn sweep_percent_extremes_still_build() {
        for sweep in [0u32, 1, 100, 5000] {
            let cache = CacheBuilder::new()
                .num_shards(2)
                .slots_per_shard(8)
                .sweep_percent(sweep)
                .try_build::<u8>()
                .unwrap();
            for i in 0..50u8 {
                cache.put(&[i], i);
            }
            cache.check_invariants().unwrap();
        }
    }
}

// ==============================================
// Statistics
// ==============================================

mod statistics {
    use super::*;

    #[test]
    fn hits_and_misses_are_counted() {
        let cache: CloxCache<String> = CloxCache::new(Config {
            num_shards: 8,
            slots_per_shard: 64,
            collect_stats: true,
            ..Config::default()
        })
        .unwrap();

        cache.put("k1", "v1".to_string());
        cache.put("k2", "v2".to_string());
        cache.get("k1");
        cache.get("k2");
        cache.get("k3");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 2.0 / 3.0);
    }

    #[test]
    fn evictions_are_counted_when_entries_are_unlinked() {
        // No ghost room: every eviction is an unlink.
        let cache = CacheBuilder::new()
            .num_shards(1)
            .slots_per_shard(8)
            .capacity(8)
            .sweep_percent(100)
            .collect_stats(true)
            .try_build::<u64>()
            .unwrap();

        for i in 0..100u64 {
            cache.put(&i.to_le_bytes(), i);
        }
        assert!(cache.stats().evictions > 0);
    }
}

// ==============================================
// Eviction & Ghost Revival
// ==============================================

mod eviction {
    use super::*;

    #[test]
    fn capacity_holds_through_heavy_churn() {
        let cache = CacheBuilder::new()
            .num_shards(4)
            .slots_per_shard(32)
            .capacity(64)
            .sweep_percent(100)
            .try_build::<u64>()
            .unwrap();

        for i in 0..5_000u64 {
            cache.put(&(i % 700).to_le_bytes(), i);
            assert!(cache.len() <= cache.capacity());
        }
        cache.check_invariants().unwrap();
    }

    #[test]
    fn demoted_key_revives_with_a_fresh_value() {
        // Half the slots are capacity, so demoted entries linger as ghosts.
        let cache = CacheBuilder::new()
            .num_shards(1)
            .slots_per_shard(16)
            .capacity(4)
            .sweep_percent(100)
            .try_build::<u64>()
            .unwrap();

        cache.put("revenant", 1);
        // Five cold inserts: three fill the shard, the fourth demotes the
        // oldest entry (the revenant), the fifth demotes a cold key. The
        // ghost queue never fills, so the revenant stays linked.
        for i in 0..5u64 {
            assert!(cache.put(&i.to_le_bytes(), i));
        }
        assert_eq!(cache.get("revenant"), None, "ghost must be invisible");

        // Revival through put: visible again with the new value.
        assert!(cache.put("revenant", 2));
        assert_eq!(cache.get("revenant"), Some(2));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn adaptive_state_stays_in_bounds_after_churn() {
        let cache = CacheBuilder::new()
            .num_shards(2)
            .slots_per_shard(32)
            .capacity(16)
            .sweep_percent(100)
            .try_build::<u64>()
            .unwrap();

        for i in 0..20_000u64 {
            let key = (i % 300).to_le_bytes();
            if i % 4 == 0 {
                cache.get(&key);
            } else {
                cache.put(&key, i);
            }
        }

        for snapshot in cache.adaptive_stats() {
            assert!((1..=14).contains(&snapshot.k), "k out of range: {}", snapshot.k);
            assert!(
                (0.05..=0.40).contains(&snapshot.rate_low),
                "rate_low out of range: {}",
                snapshot.rate_low
            );
            assert!(
                (0.30..=0.80).contains(&snapshot.rate_high),
                "rate_high out of range: {}",
                snapshot.rate_high
            );
            assert!(snapshot.live_entries <= 8);
        }
        cache.check_invariants().unwrap();
    }
}
