//! Cache Module
//!
//! Provides the cache contract, the expiring store, and the LRU-bounded
//! decorators layered over it.

mod entry;
mod max_count;
mod max_memory;
mod observer;
mod recency;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use max_count::MaxCountCache;
pub use max_memory::MaxMemoryCache;
pub use observer::{EvictionObserver, EvictionReason, ObserverChain, ObserverId};
pub use recency::RecencySequence;
pub use stats::CacheStats;
pub use store::{ExpiringStore, StoreOptions};

// == Cache Contract ==
/// Operations every cache layer supports.
///
/// A `ttl` of [`Duration::ZERO`] stores the value without expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the value for `key`, or [`CacheError::Miss`](crate::CacheError::Miss).
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Stores `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes `key` and returns the value it held.
    async fn load_and_delete(&self, key: &str) -> Result<Vec<u8>>;

    /// Whether `key` holds a live value. Expired entries are evicted as a
    /// side effect, but hit/miss counters are left alone.
    async fn contains(&self, key: &str) -> Result<bool>;
}

#[async_trait]
impl<T: Cache + ?Sized> Cache for Arc<T> {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<Vec<u8>> {
        (**self).load_and_delete(key).await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        (**self).contains(key).await
    }
}
