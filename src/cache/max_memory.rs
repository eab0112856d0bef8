//! Memory-Bounded LRU Module
//!
//! Decorator that keeps the total size of the values it admitted within a
//! byte budget, evicting least recently used keys to make room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{Cache, EvictionReason, ExpiringStore, ObserverId, RecencySequence};
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    recency: RecencySequence,
    /// Size recorded for each tracked key at admission
    sizes: HashMap<String, usize>,
    used: usize,
}

impl MemoryState {
    fn forget(&mut self, key: &str) {
        if let Some(size) = self.sizes.remove(key) {
            self.used -= size;
            self.recency.remove(key);
        }
    }
}

// == Max Memory Cache ==
/// Memory-bounded LRU decorator.
///
/// A value larger than the whole budget is refused up front, before
/// anything is evicted. Otherwise least recently used keys are evicted
/// until the new value fits.
pub struct MaxMemoryCache<C = Arc<ExpiringStore>> {
    inner: C,
    store: Arc<ExpiringStore>,
    observer_id: ObserverId,
    max_bytes: usize,
    op_lock: tokio::sync::Mutex<()>,
    state: Arc<Mutex<MemoryState>>,
}

impl MaxMemoryCache<Arc<ExpiringStore>> {
    /// Bounds `store` directly.
    pub fn new(store: Arc<ExpiringStore>, max_bytes: usize) -> Self {
        Self::layered(Arc::clone(&store), store, max_bytes)
    }
}

impl<C: Cache> MaxMemoryCache<C> {
    /// Bounds `inner`, another layer over `store`.
    pub fn layered(inner: C, store: Arc<ExpiringStore>, max_bytes: usize) -> Self {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        let tracked = Arc::clone(&state);
        let observer_id = store.observers().register(
            "max-memory",
            Arc::new(move |key: &str, _value: &[u8], _reason: EvictionReason| {
                tracked.lock().forget(key);
            }),
        );

        Self {
            inner,
            store,
            observer_id,
            max_bytes,
            op_lock: tokio::sync::Mutex::new(()),
            state,
        }
    }

    /// Bytes currently admitted through this decorator.
    pub fn used(&self) -> usize {
        self.state.lock().used
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Tracked keys, least recently used first.
    pub fn recency(&self) -> Vec<String> {
        self.state.lock().recency.keys()
    }

    /// Next key to evict, or `None` once `needed` more bytes fit.
    fn next_victim(&self, needed: usize) -> std::result::Result<Option<String>, ()> {
        let state = self.state.lock();
        if state.used + needed <= self.max_bytes {
            return Ok(None);
        }
        state.recency.head().map(|key| Some(key.to_owned())).ok_or(())
    }
}

impl<C> Drop for MaxMemoryCache<C> {
    fn drop(&mut self) {
        self.store.observers().unregister(self.observer_id);
    }
}

#[async_trait]
impl<C: Cache> Cache for MaxMemoryCache<C> {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let _guard = self.op_lock.lock().await;
        let value = self.inner.get(key).await?;
        {
            let mut state = self.state.lock();
            if state.sizes.contains_key(key) {
                state.recency.touch(key);
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let size = value.len();
        if size > self.max_bytes {
            warn!(key, size, max_bytes = self.max_bytes, "refusing value larger than budget");
            return Err(CacheError::over_capacity(
                key,
                format!("value of {size} bytes exceeds the {} byte budget", self.max_bytes),
            ));
        }

        let _guard = self.op_lock.lock().await;

        // Drop the previous value first so its bytes are not counted twice.
        match self.inner.load_and_delete(key).await {
            Ok(_) | Err(CacheError::Miss(_)) => {}
            Err(err) => return Err(err),
        }
        self.state.lock().forget(key);

        loop {
            let victim = match self.next_victim(size) {
                Ok(None) => break,
                Ok(Some(victim)) => victim,
                Err(()) => {
                    warn!(key, size, "nothing left to evict, refusing write");
                    return Err(CacheError::over_capacity(
                        key,
                        "not enough memory could be reclaimed",
                    ));
                }
            };
            debug!(key, victim = %victim, "memory budget exceeded, evicting LRU key");
            self.inner.delete(&victim).await?;
            // No-op unless the store had already lost the key.
            self.state.lock().forget(&victim);
        }

        self.inner.set(key, value, ttl).await?;

        let mut state = self.state.lock();
        state.used += size;
        state.sizes.insert(key.to_owned(), size);
        state.recency.append(key);
        Ok(())
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
