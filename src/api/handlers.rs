//! API Handlers
//!
//! HTTP request handlers for each front-end endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::{Cache, ExpiringStore, MaxCountCache, MaxMemoryCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, SetRequest, SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// `cache` is the outermost layer callers talk to; `store` is the expiring
/// store underneath it, kept for statistics and shutdown.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn Cache>,
    pub store: Arc<ExpiringStore>,
    pub default_ttl: Duration,
}

impl AppState {
    /// Serves `store` directly, without any bound.
    pub fn new(store: Arc<ExpiringStore>, default_ttl: Duration) -> Self {
        Self {
            cache: store.clone(),
            store,
            default_ttl,
        }
    }

    /// Builds the layer stack described by `config` over `store`.
    ///
    /// The memory bound (if any) sits directly on the store and the count
    /// bound (if any) wraps it.
    pub fn from_config(config: &Config, store: Arc<ExpiringStore>) -> Self {
        let cache: Arc<dyn Cache> = match (config.max_entries, config.max_memory_bytes) {
            (0, 0) => store.clone(),
            (max_entries, 0) => Arc::new(MaxCountCache::new(store.clone(), max_entries)),
            (0, max_bytes) => Arc::new(MaxMemoryCache::new(store.clone(), max_bytes)),
            (max_entries, max_bytes) => Arc::new(MaxCountCache::layered(
                MaxMemoryCache::new(store.clone(), max_bytes),
                store.clone(),
                max_entries,
            )),
        };

        Self {
            cache,
            store,
            default_ttl: config.default_ttl(),
        }
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req
        .ttl
        .map(Duration::from_secs)
        .unwrap_or(state.default_ttl);
    state
        .cache
        .set(&req.key, req.value.into_bytes(), ttl)
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get(&key).await?;
    Ok(Json(GetResponse::new(key, String::from_utf8_lossy(&value))))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key).await?;
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /take/:key
pub async fn take_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.load_and_delete(&key).await?;
    Ok(Json(GetResponse::new(key, String::from_utf8_lossy(&value))))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.store.stats().await))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
