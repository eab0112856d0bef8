//! Strategy Module
//!
//! Policies that decide how reads and writes reach a cache, independently
//! of which cache they are applied to.
//!
//! - [`ReadThrough`]: load from a backing source on miss
//! - [`WriteBackCache`]: persist entries to a backing store when evicted
//! - [`CacheModel`]: pairs any [`Cache`] with any [`Strategy`]

mod model;
mod read_through;
mod write_back;

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::Result;

pub use model::{CacheModel, ReadThroughCache};
pub use read_through::{loader_fn, Loader, LoaderFn, ReadThrough};
pub use write_back::{persister_fn, Persister, PersisterFn, WriteBackCache};

// == Strategy Contract ==
/// Read/write policy applied on top of a cache passed in by the caller.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn get(&self, key: &str, cache: &dyn Cache) -> Result<Vec<u8>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration, cache: &dyn Cache)
        -> Result<()>;
}

/// Strategy that forwards every call unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Strategy for Passthrough {
    async fn get(&self, key: &str, cache: &dyn Cache) -> Result<Vec<u8>> {
        cache.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        cache: &dyn Cache,
    ) -> Result<()> {
        cache.set(key, value, ttl).await
    }
}
