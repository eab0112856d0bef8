//! Expiring Store Module
//!
//! The innermost cache layer: a lock-guarded map with lazy TTL expiry, an
//! optional background sweeper, and the eviction observer chain.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::stats::StatsRecorder;
use crate::cache::{
    current_timestamp_ms, Cache, CacheEntry, CacheStats, EvictionReason, ObserverChain,
};
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweeper;

// == Store Options ==
/// Construction options for [`ExpiringStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Interval between background sweeps; `None` disables the sweeper
    pub sweep_interval: Option<Duration>,
    /// Maximum number of entries inspected per sweep
    pub sweep_batch: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sweep_interval: None,
            sweep_batch: 256,
        }
    }
}

impl StoreOptions {
    /// Options with a background sweeper.
    pub fn with_sweeper(interval: Duration, batch: usize) -> Self {
        Self {
            sweep_interval: Some(interval),
            sweep_batch: batch.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, CacheEntry>,
    closed: bool,
    /// Keys still to inspect in the current sweep cycle
    sweep_queue: VecDeque<String>,
}

// == Expiring Store ==
/// Thread-safe map from key to [`CacheEntry`] with lazy expiry.
///
/// Every entry that leaves the map, for any reason, is reported once to
/// the registered [`ObserverChain`].
pub struct ExpiringStore {
    state: RwLock<StoreState>,
    observers: ObserverChain,
    stats: StatsRecorder,
    options: StoreOptions,
    stop_tx: watch::Sender<bool>,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ExpiringStore {
    // == Constructors ==
    /// Creates a store without a background sweeper.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::unstarted(StoreOptions::default()))
    }

    /// Creates a store and, if `options.sweep_interval` is set, starts its
    /// sweeper on the current tokio runtime.
    pub fn with_options(options: StoreOptions) -> Result<Arc<Self>> {
        let interval = options.sweep_interval;
        let store = Arc::new(Self::unstarted(options));

        if let Some(interval) = interval {
            if interval.is_zero() {
                return Err(CacheError::Config(
                    "sweep interval must be greater than zero".to_string(),
                ));
            }
            tokio::runtime::Handle::try_current().map_err(|_| {
                CacheError::Config("the sweeper requires a running tokio runtime".to_string())
            })?;
            let handle = spawn_sweeper(Arc::downgrade(&store), interval, store.stop_tx.subscribe());
            *store.sweeper.lock() = Some(handle);
        }

        Ok(store)
    }

    fn unstarted(options: StoreOptions) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            state: RwLock::new(StoreState::default()),
            observers: ObserverChain::new(),
            stats: StatsRecorder::default(),
            options,
            stop_tx,
            sweeper: parking_lot::Mutex::new(None),
        }
    }

    /// The observer chain fired on every eviction.
    pub fn observers(&self) -> &ObserverChain {
        &self.observers
    }

    // == Eviction ==
    /// Removes `key` and reports it. Caller holds the write lock.
    fn evict_locked(
        &self,
        entries: &mut HashMap<String, CacheEntry>,
        key: &str,
        reason: EvictionReason,
    ) -> Option<CacheEntry> {
        let entry = entries.remove(key)?;
        self.stats.record_eviction(reason.is_expiry());
        debug!(key, %reason, "evicting entry");
        self.observers.notify(key, &entry.value, reason);
        Some(entry)
    }

    // == Sweep ==
    /// Inspects up to `sweep_batch` entries, evicting the expired ones.
    ///
    /// A cycle starts from a snapshot of the current keys and is worked
    /// through over consecutive calls; keys set during a cycle are picked
    /// up by the next one. Returns the number removed.
    pub async fn sweep_once(&self) -> usize {
        let now = current_timestamp_ms();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.closed {
            return 0;
        }

        if state.sweep_queue.is_empty() {
            state.sweep_queue.extend(state.entries.keys().cloned());
        }

        let batch = self.options.sweep_batch.max(1);
        let mut removed = 0;
        for _ in 0..batch {
            let Some(key) = state.sweep_queue.pop_front() else {
                break;
            };
            let expired = state
                .entries
                .get(&key)
                .is_some_and(|entry| entry.is_expired_at(now));
            if expired {
                self.evict_locked(&mut state.entries, &key, EvictionReason::Swept);
                removed += 1;
            }
        }

        removed
    }

    // == Shutdown ==
    /// Closes the store, reporting every remaining entry as evicted.
    ///
    /// Stops the sweeper if one is running. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if state.closed {
                debug!("store already shut down");
                return Ok(());
            }
            state.closed = true;
            self.stop_tx.send_replace(true);

            state.sweep_queue.clear();
            let entries = std::mem::take(&mut state.entries);
            for (key, entry) in &entries {
                self.stats.record_eviction(false);
                self.observers.notify(key, &entry.value, EvictionReason::Shutdown);
            }
            info!(released = entries.len(), "store shut down");
        }

        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            if let Err(err) = handle.await {
                warn!(error = %err, "sweeper task ended abnormally");
            }
        }
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    // == Introspection ==
    /// Number of resident entries, expired ones included until removed.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        let total = self.len().await;
        self.stats.snapshot(total)
    }

    /// Copies of all live (non-expired) entries.
    pub async fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        let now = current_timestamp_ms();
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}

impl std::fmt::Debug for ExpiringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("options", &self.options)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Cache for ExpiringStore {
    // == Get ==
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let now = current_timestamp_ms();
        {
            let state = self.state.read().await;
            if state.closed {
                return Err(CacheError::Closed);
            }
            match state.entries.get(key) {
                None => {
                    self.stats.record_miss();
                    return Err(CacheError::Miss(key.to_string()));
                }
                Some(entry) if !entry.is_expired_at(now) => {
                    self.stats.record_hit();
                    return Ok(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Seen expired under the shared lock; a writer may have refreshed
        // the key before we got exclusive access.
        let mut state = self.state.write().await;
        if state.closed {
            return Err(CacheError::Closed);
        }
        match state.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.stats.record_hit();
                Ok(entry.value.clone())
            }
            Some(_) => {
                self.evict_locked(&mut state.entries, key, EvictionReason::Expired);
                self.stats.record_miss();
                Err(CacheError::Miss(key.to_string()))
            }
            None => {
                self.stats.record_miss();
                Err(CacheError::Miss(key.to_string()))
            }
        }
    }

    // == Set ==
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(CacheError::Closed);
        }
        state
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(CacheError::Closed);
        }
        self.evict_locked(&mut state.entries, key, EvictionReason::Deleted);
        Ok(())
    }

    // == Load And Delete ==
    async fn load_and_delete(&self, key: &str) -> Result<Vec<u8>> {
        let now = current_timestamp_ms();
        let mut state = self.state.write().await;
        if state.closed {
            return Err(CacheError::Closed);
        }
        let expired = match state.entries.get(key) {
            None => return Err(CacheError::Miss(key.to_string())),
            Some(entry) => entry.is_expired_at(now),
        };
        if expired {
            self.evict_locked(&mut state.entries, key, EvictionReason::Expired);
            return Err(CacheError::Miss(key.to_string()));
        }
        self.evict_locked(&mut state.entries, key, EvictionReason::Taken)
            .map(|entry| entry.value)
            .ok_or_else(|| CacheError::Miss(key.to_string()))
    }

    // == Contains ==
    async fn contains(&self, key: &str) -> Result<bool> {
        let now = current_timestamp_ms();
        {
            let state = self.state.read().await;
            if state.closed {
                return Err(CacheError::Closed);
            }
            match state.entries.get(key) {
                None => return Ok(false),
                Some(entry) if !entry.is_expired_at(now) => return Ok(true),
                Some(_) => {}
            }
        }

        let mut state = self.state.write().await;
        if state.closed {
            return Err(CacheError::Closed);
        }
        let expired = match state.entries.get(key) {
            None => return Ok(false),
            Some(entry) => entry.is_expired_at(now),
        };
        if expired {
            self.evict_locked(&mut state.entries, key, EvictionReason::Expired);
        }
        Ok(!expired)
    }
}
