//! Read-Through Strategy
//!
//! On a miss, loads the value from a backing source and stores it in the
//! cache before returning it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::cache::Cache;
use crate::error::{BoxError, CacheError, Result};
use crate::strategy::Strategy;

// == Loader Contract ==
/// Backing source consulted on a cache miss.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> std::result::Result<Vec<u8>, BoxError>;
}

/// [`Loader`] backed by an async closure. Built with [`loader_fn`].
#[derive(Debug, Clone)]
pub struct LoaderFn<F>(F);

/// Wraps `f(key)` as a [`Loader`].
pub fn loader_fn<F, Fut>(f: F) -> LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Vec<u8>, BoxError>> + Send,
{
    LoaderFn(f)
}

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Vec<u8>, BoxError>> + Send,
{
    async fn load(&self, key: &str) -> std::result::Result<Vec<u8>, BoxError> {
        (self.0)(key.to_owned()).await
    }
}

// == Read Through ==
/// Read-through strategy.
///
/// Loads are serialized through a single lock per instance, so one slow
/// load holds up every other miss on the same strategy. After taking the
/// lock the cache is checked again, so concurrent misses on one key load
/// it once.
#[derive(Debug)]
pub struct ReadThrough<L> {
    loader: L,
    ttl: Duration,
    load_timeout: Option<Duration>,
    load_lock: Mutex<()>,
}

impl<L: Loader> ReadThrough<L> {
    /// Loaded values are cached with `ttl` (zero = no expiry).
    pub fn new(loader: L, ttl: Duration) -> Self {
        Self {
            loader,
            ttl,
            load_timeout: None,
            load_lock: Mutex::new(()),
        }
    }

    /// Fails loads that take longer than `timeout` with
    /// [`CacheError::LoadTimeout`].
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        let loading = self.loader.load(key);
        let loaded = match self.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, loading).await.map_err(|_| {
                warn!(key, ?timeout, "loader timed out");
                CacheError::LoadTimeout {
                    key: key.to_string(),
                    timeout,
                }
            })?,
            None => loading.await,
        };

        loaded.map_err(|source| {
            warn!(key, error = %source, "loader failed");
            CacheError::Load {
                key: key.to_string(),
                source,
            }
        })
    }
}

#[async_trait]
impl<L: Loader> Strategy for ReadThrough<L> {
    async fn get(&self, key: &str, cache: &dyn Cache) -> Result<Vec<u8>> {
        match cache.get(key).await {
            Err(CacheError::Miss(_)) => {}
            found => return found,
        }

        let _guard = self.load_lock.lock().await;
        // Another task may have loaded it while we waited for the lock.
        if cache.contains(key).await? {
            return cache.get(key).await;
        }

        let value = self.load(key).await?;
        if let Err(err) = cache.set(key, value.clone(), self.ttl).await {
            error!(key, error = %err, "loaded value could not be cached");
            return Err(CacheError::Refill {
                key: key.to_string(),
                value,
                source: Box::new(err),
            });
        }

        debug!(key, size = value.len(), "loaded and cached");
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        cache: &dyn Cache,
    ) -> Result<()> {
        let _guard = self.load_lock.lock().await;
        cache.set(key, value, ttl).await
    }
}
