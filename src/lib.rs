//! Stratacache - a layered in-process cache
//!
//! An expiring key/value store with bounded LRU decorators, read-through
//! loading and write-back persistence, composable over a single store.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod strategy;
pub mod tasks;

pub use api::AppState;
pub use cache::{
    Cache, CacheStats, EvictionObserver, EvictionReason, ExpiringStore, MaxCountCache,
    MaxMemoryCache, StoreOptions,
};
pub use config::Config;
pub use error::{BoxError, CacheError, Result};
pub use strategy::{
    loader_fn, persister_fn, CacheModel, Loader, Passthrough, Persister, ReadThrough,
    ReadThroughCache, Strategy, WriteBackCache,
};
