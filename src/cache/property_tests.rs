//! Property-based tests for the store and the bounded decorators.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_test::block_on;

use crate::cache::{Cache, ExpiringStore, MaxCountCache, MaxMemoryCache};
use crate::error::CacheError;

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}"
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..128)
}

fn unique_keys(min: usize, max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set(key_strategy(), min..max).prop_map(|set| set.into_iter().collect())
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Vec<u8> },
    Get { key: String },
    Delete { key: String },
    Take { key: String },
}

/// Ops over a small key space so that keys collide often.
fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = "[a-f]";
    prop_oneof![
        (key, value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Delete { key }),
        key.prop_map(|key| CacheOp::Take { key }),
    ]
}

fn apply<C: Cache>(cache: &C, op: &CacheOp) -> Result<(), CacheError> {
    block_on(async {
        match op {
            CacheOp::Set { key, value } => cache.set(key, value.clone(), Duration::ZERO).await,
            CacheOp::Get { key } => cache.get(key).await.map(drop),
            CacheOp::Delete { key } => cache.delete(key).await,
            CacheOp::Take { key } => cache.load_and_delete(key).await.map(drop),
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let store = ExpiringStore::new();
        block_on(store.set(&key, value.clone(), Duration::ZERO)).unwrap();

        prop_assert_eq!(block_on(store.get(&key)).unwrap(), value);
    }

    #[test]
    fn prop_overwrite_keeps_one_entry(
        key in key_strategy(),
        first in value_strategy(),
        second in value_strategy()
    ) {
        let store = ExpiringStore::new();
        block_on(store.set(&key, first, Duration::ZERO)).unwrap();
        block_on(store.set(&key, second.clone(), Duration::ZERO)).unwrap();

        prop_assert_eq!(block_on(store.get(&key)).unwrap(), second);
        prop_assert_eq!(block_on(store.len()), 1);
    }

    #[test]
    fn prop_take_removes_entry(key in key_strategy(), value in value_strategy()) {
        let store = ExpiringStore::new();
        block_on(store.set(&key, value.clone(), Duration::ZERO)).unwrap();

        prop_assert_eq!(block_on(store.load_and_delete(&key)).unwrap(), value);
        prop_assert!(block_on(store.get(&key)).unwrap_err().is_miss());
        prop_assert!(block_on(store.load_and_delete(&key)).unwrap_err().is_miss());
    }

    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let store = ExpiringStore::new();
        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;
        let mut expected_evictions = 0u64;

        for op in &ops {
            let present = match op {
                CacheOp::Set { key, .. }
                | CacheOp::Get { key }
                | CacheOp::Delete { key }
                | CacheOp::Take { key } => block_on(store.snapshot()).iter().any(|(k, _)| k == key),
            };
            let result = apply(&store, op);
            match op {
                CacheOp::Get { .. } if result.is_ok() => expected_hits += 1,
                CacheOp::Get { .. } => expected_misses += 1,
                CacheOp::Delete { .. } | CacheOp::Take { .. } if present => expected_evictions += 1,
                _ => {}
            }
        }

        let stats = block_on(store.stats());
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.evictions, expected_evictions);
        prop_assert_eq!(stats.total_entries, block_on(store.len()));
    }

    #[test]
    fn prop_count_bound_never_exceeded(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let max_count = 3;
        let store = ExpiringStore::new();
        let cache = MaxCountCache::new(Arc::clone(&store), max_count);

        for op in &ops {
            let _ = apply(&cache, op);
            let len = block_on(store.len());
            prop_assert!(len <= max_count, "store holds {} entries, limit {}", len, max_count);
            prop_assert_eq!(cache.count(), len);
            prop_assert_eq!(cache.recency().len(), len);
        }
    }

    #[test]
    fn prop_memory_bound_never_exceeded(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let max_bytes = 200;
        let store = ExpiringStore::new();
        let cache = MaxMemoryCache::new(Arc::clone(&store), max_bytes);

        for op in &ops {
            let _ = apply(&cache, op);
            let stored: usize = block_on(store.snapshot()).iter().map(|(_, v)| v.len()).sum();
            prop_assert!(cache.used() <= max_bytes, "used {} over {}", cache.used(), max_bytes);
            prop_assert_eq!(cache.used(), stored);
        }
    }

    #[test]
    fn prop_full_count_bound_evicts_least_recent(
        keys in unique_keys(2, 8),
        new_key in key_strategy()
    ) {
        prop_assume!(!keys.contains(&new_key));

        let store = ExpiringStore::new();
        let cache = MaxCountCache::new(Arc::clone(&store), keys.len());
        for key in &keys {
            block_on(cache.set(key, b"v".to_vec(), Duration::ZERO)).unwrap();
        }

        // Reading the oldest key makes the second one least recent.
        block_on(cache.get(&keys[0])).unwrap();

        let err = block_on(cache.set(&new_key, b"v".to_vec(), Duration::ZERO)).unwrap_err();
        prop_assert!(err.is_over_capacity());
        prop_assert!(block_on(store.get(&keys[1])).unwrap_err().is_miss());
        prop_assert!(block_on(store.get(&keys[0])).is_ok());

        // The freed slot admits the retry.
        block_on(cache.set(&new_key, b"v".to_vec(), Duration::ZERO)).unwrap();
        prop_assert_eq!(cache.count(), keys.len());
    }

    #[test]
    fn prop_memory_bound_evicts_in_recency_order(
        keys in unique_keys(3, 8),
        new_key in key_strategy()
    ) {
        prop_assume!(!keys.contains(&new_key));

        let value_len = 10;
        let store = ExpiringStore::new();
        let cache = MaxMemoryCache::new(Arc::clone(&store), keys.len() * value_len);
        for key in &keys {
            block_on(cache.set(key, vec![0; value_len], Duration::ZERO)).unwrap();
        }

        // Needs room for two values: the two least recent keys go.
        block_on(cache.set(&new_key, vec![1; value_len * 2], Duration::ZERO)).unwrap();

        let remaining: HashSet<String> =
            block_on(store.snapshot()).into_iter().map(|(k, _)| k).collect();
        prop_assert!(!remaining.contains(&keys[0]));
        prop_assert!(!remaining.contains(&keys[1]));
        for key in keys.iter().skip(2) {
            prop_assert!(remaining.contains(key));
        }
        prop_assert!(remaining.contains(&new_key));
    }
}

// TTL cases sleep, so keep them few.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    #[test]
    fn prop_ttl_expiration(key in key_strategy(), value in value_strategy()) {
        let store = ExpiringStore::new();
        block_on(store.set(&key, value.clone(), Duration::from_millis(30))).unwrap();
        prop_assert_eq!(block_on(store.get(&key)).unwrap(), value);

        std::thread::sleep(Duration::from_millis(60));

        prop_assert!(block_on(store.get(&key)).unwrap_err().is_miss());
        prop_assert_eq!(block_on(store.stats()).expirations, 1);
    }
}
