//! Count-Bounded LRU Module
//!
//! Decorator that admits at most `max_count` keys and evicts the least
//! recently used one when a new key does not fit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{Cache, EvictionReason, ExpiringStore, ObserverId, RecencySequence};
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
struct CountState {
    recency: RecencySequence,
    count: usize,
}

impl CountState {
    fn forget(&mut self, key: &str) {
        if self.recency.remove(key) {
            self.count -= 1;
        }
    }
}

enum Admission {
    Tracked,
    New,
    Full(Option<String>),
}

// == Max Count Cache ==
/// Count-bounded LRU decorator.
///
/// When a new key would push the count past `max_count`, the least recently
/// used key is evicted and the write is refused with
/// [`CacheError::OverCapacity`]; the caller may retry once room was made.
pub struct MaxCountCache<C = Arc<ExpiringStore>> {
    inner: C,
    store: Arc<ExpiringStore>,
    observer_id: ObserverId,
    max_count: usize,
    /// Serializes whole operations, including the inner call
    op_lock: tokio::sync::Mutex<()>,
    /// Bookkeeping shared with the eviction observer; never held across `.await`
    state: Arc<Mutex<CountState>>,
}

impl MaxCountCache<Arc<ExpiringStore>> {
    /// Bounds `store` directly.
    pub fn new(store: Arc<ExpiringStore>, max_count: usize) -> Self {
        Self::layered(Arc::clone(&store), store, max_count)
    }
}

impl<C: Cache> MaxCountCache<C> {
    /// Bounds `inner`, another layer over `store`.
    ///
    /// The observer is registered on `store`, so evictions caused by any
    /// layer keep this decorator's count accurate.
    pub fn layered(inner: C, store: Arc<ExpiringStore>, max_count: usize) -> Self {
        let state = Arc::new(Mutex::new(CountState::default()));
        let tracked = Arc::clone(&state);
        let observer_id = store.observers().register(
            "max-count",
            Arc::new(move |key: &str, _value: &[u8], _reason: EvictionReason| {
                tracked.lock().forget(key);
            }),
        );

        Self {
            inner,
            store,
            observer_id,
            max_count,
            op_lock: tokio::sync::Mutex::new(()),
            state,
        }
    }

    /// Number of keys currently admitted through this decorator.
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Tracked keys, least recently used first.
    pub fn recency(&self) -> Vec<String> {
        self.state.lock().recency.keys()
    }

    fn admit(&self, key: &str) -> Admission {
        let mut state = self.state.lock();
        if state.recency.contains(key) {
            state.recency.touch(key);
            Admission::Tracked
        } else if state.count + 1 > self.max_count {
            Admission::Full(state.recency.head().map(str::to_owned))
        } else {
            state.count += 1;
            state.recency.append(key);
            Admission::New
        }
    }
}

impl<C> Drop for MaxCountCache<C> {
    fn drop(&mut self) {
        self.store.observers().unregister(self.observer_id);
    }
}

#[async_trait]
impl<C: Cache> Cache for MaxCountCache<C> {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let _guard = self.op_lock.lock().await;
        let value = self.inner.get(key).await?;
        {
            let mut state = self.state.lock();
            if state.recency.contains(key) {
                state.recency.touch(key);
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let _guard = self.op_lock.lock().await;

        // Probe first so an expired entry is evicted, and untracked, before
        // deciding whether this key counts as new.
        self.inner.contains(key).await?;

        match self.admit(key) {
            Admission::Full(victim) => {
                if let Some(victim) = victim {
                    debug!(key, victim = %victim, "count limit reached, evicting LRU key");
                    self.inner.delete(&victim).await?;
                    // No-op unless the store had already lost the key.
                    self.state.lock().forget(&victim);
                }
                warn!(key, max_count = self.max_count, "refusing write over count limit");
                Err(CacheError::over_capacity(
                    key,
                    format!("count limit of {} reached", self.max_count),
                ))
            }
            admission => {
                if let Err(err) = self.inner.set(key, value, ttl).await {
                    if matches!(admission, Admission::New) {
                        self.state.lock().forget(key);
                    }
                    return Err(err);
                }
                // An inner layer may have replaced the old entry on the way
                // down, which our observer saw as an eviction.
                let mut state = self.state.lock();
                if !state.recency.contains(key) {
                    state.count += 1;
                    state.recency.append(key);
                }
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.inner.delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<Vec<u8>> {
        let _guard = self.op_lock.lock().await;
        self.inner.load_and_delete(key).await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        self.inner.contains(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded(max_count: usize) -> (Arc<ExpiringStore>, MaxCountCache) {
        let store = ExpiringStore::new();
        let cache = MaxCountCache::new(Arc::clone(&store), max_count);
        (store, cache)
    }

    #[tokio::test]
    async fn test_fills_up_to_max() {
        let (store, cache) = bounded(3);
        for key in ["a", "b", "c"] {
            cache.set(key, b"v".to_vec(), Duration::ZERO).await.unwrap();
        }

        assert_eq!(cache.count(), 3);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_overflow_refuses_and_evicts_lru() {
        let (store, cache) = bounded(2);
        cache.set("a", b"1".to_vec(), Duration::ZERO).await.unwrap();
        cache.set("b", b"2".to_vec(), Duration::ZERO).await.unwrap();

        let err = cache.set("c", b"3".to_vec(), Duration::ZERO).await.unwrap_err();
        assert!(err.is_over_capacity());

        assert_eq!(cache.count(), 1);
        assert!(matches!(store.get("a").await, Err(CacheError::Miss(_))));
        assert!(matches!(store.get("c").await, Err(CacheError::Miss(_))));

        // Room was made, so a retry is admitted.
        cache.set("c", b"3".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.recency(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_writes_do_not_count_as_reads() {
        let (store, cache) = bounded(10);
        for key in ["a", "b", "c"] {
            cache.set(key, b"v".to_vec(), Duration::ZERO).await.unwrap();
        }
        cache.set("a", b"w".to_vec(), Duration::ZERO).await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(cache.count(), 3);
    }

    #[tokio::test]
    async fn test_get_refreshes_recency() {
        let (_store, cache) = bounded(2);
        cache.set("a", b"1".to_vec(), Duration::ZERO).await.unwrap();
        cache.set("b", b"2".to_vec(), Duration::ZERO).await.unwrap();
        cache.get("a").await.unwrap();

        assert!(cache
            .set("c", b"3".to_vec(), Duration::ZERO)
            .await
            .unwrap_err()
            .is_over_capacity());

        assert!(matches!(cache.get("b").await, Err(CacheError::Miss(_))));
        assert_eq!(cache.get("a").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_overwrite_does_not_count_twice() {
        let (_store, cache) = bounded(2);
        cache.set("a", b"1".to_vec(), Duration::ZERO).await.unwrap();
        cache.set("a", b"2".to_vec(), Duration::ZERO).await.unwrap();
        cache.set("b", b"3".to_vec(), Duration::ZERO).await.unwrap();

        assert_eq!(cache.count(), 2);
        assert_eq!(cache.get("a").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_store_evictions_release_slots() {
        let (store, cache) = bounded(2);
        cache.set("a", b"1".to_vec(), Duration::ZERO).await.unwrap();
        cache
            .set("b", b"2".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();

        store.delete("a").await.unwrap();
        assert_eq!(cache.count(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        // Lazy expiry on read frees the slot held by "b".
        assert!(matches!(cache.get("b").await, Err(CacheError::Miss(_))));
        assert_eq!(cache.count(), 0);

        cache.set("c", b"3".to_vec(), Duration::ZERO).await.unwrap();
        cache.set("d", b"4".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.recency(), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_load_and_delete_untracks_key() {
        let (_store, cache) = bounded(1);
        cache.set("a", b"1".to_vec(), Duration::ZERO).await.unwrap();

        assert_eq!(cache.load_and_delete("a").await.unwrap(), b"1");
        assert_eq!(cache.count(), 0);
        cache.set("b", b"2".to_vec(), Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_store_rolls_back() {
        let (store, cache) = bounded(2);
        store.shutdown().await.unwrap();

        assert!(matches!(
            cache.set("a", b"1".to_vec(), Duration::ZERO).await,
            Err(CacheError::Closed)
        ));
        assert_eq!(cache.count(), 0);
        assert!(cache.recency().is_empty());
    }

    #[tokio::test]
    async fn test_drop_unregisters_observer() {
        let store = ExpiringStore::new();
        {
            let _cache = MaxCountCache::new(Arc::clone(&store), 4);
            assert_eq!(store.observers().names(), vec!["max-count"]);
        }
        assert!(store.observers().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_ops_stay_consistent() {
        use crate::cache::MaxMemoryCache;

        let store = ExpiringStore::new();
        let memory = MaxMemoryCache::new(Arc::clone(&store), 64);
        let cache = Arc::new(MaxCountCache::layered(memory, Arc::clone(&store), 5));

        let mut handles = Vec::new();
        for task in 0..8usize {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..300usize {
                    let key = format!("k{}", (task * 7 + i) % 12);
                    match i % 4 {
                        0 | 1 => {
                            let ttl = if i % 3 == 0 {
                                Duration::from_millis(1)
                            } else {
                                Duration::ZERO
                            };
                            let _ = cache.set(&key, vec![0; 4 + i % 16], ttl).await;
                        }
                        2 => {
                            let _ = cache.get(&key).await;
                        }
                        _ => {
                            let _ = cache.load_and_delete(&key).await;
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let count = cache.count();
        assert!(count <= cache.max_count());
        assert_eq!(count, store.len().await);
        assert_eq!(cache.recency().len(), count);
    }
}
