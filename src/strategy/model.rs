//! Cache Model
//!
//! Binds a storage layer to a read/write strategy.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::Result;
use crate::strategy::{ReadThrough, Strategy};

/// A cache whose `get`/`set` go through `strategy`, with `cache` passed in
/// as the storage to act on. `delete` and `load_and_delete` go straight to
/// the cache.
#[derive(Debug)]
pub struct CacheModel<C, S> {
    cache: C,
    strategy: S,
}

/// A cache that loads missing keys from a [`Loader`](crate::strategy::Loader).
pub type ReadThroughCache<C, L> = CacheModel<C, ReadThrough<L>>;

impl<C: Cache, S: Strategy> CacheModel<C, S> {
    pub fn new(cache: C, strategy: S) -> Self {
        Self { cache, strategy }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}

#[async_trait]
impl<C: Cache, S: Strategy> Cache for CacheModel<C, S> {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.strategy.get(key, &self.cache).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.strategy.set(key, value, ttl, &self.cache).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<Vec<u8>> {
        self.cache.load_and_delete(key).await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        self.cache.contains(key).await
    }
}
