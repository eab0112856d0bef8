//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Boxed error returned by caller-supplied loaders and persisters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// == Cache Error Enum ==
/// Unified error type for every cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is absent or has expired
    #[error("Key not found: {0}")]
    Miss(String),

    /// The store has been shut down
    #[error("Cache is closed")]
    Closed,

    /// A bounded decorator refused to admit the entry
    #[error("Over capacity for key {key}: {reason}")]
    OverCapacity { key: String, reason: String },

    /// The read-through loader failed
    #[error("Failed to load key {key}")]
    Load {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The read-through loader did not finish in time
    #[error("Loading key {key} timed out after {timeout:?}")]
    LoadTimeout { key: String, timeout: Duration },

    /// A loaded value could not be written back into the cache
    #[error("Loaded key {key} but could not store it in the cache")]
    Refill {
        key: String,
        /// The value returned by the loader
        value: Vec<u8>,
        #[source]
        source: Box<CacheError>,
    },

    /// One or more evicted entries could not be persisted
    #[error("Write-back failed for {failed} entries (first: {key})")]
    WriteBack {
        failed: usize,
        key: String,
        #[source]
        source: BoxError,
    },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration or missing runtime
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns true for a plain cache miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss(_))
    }

    /// Returns true when a bounded layer refused the write.
    pub fn is_over_capacity(&self) -> bool {
        matches!(self, CacheError::OverCapacity { .. })
    }

    pub(crate) fn over_capacity(key: &str, reason: impl Into<String>) -> Self {
        CacheError::OverCapacity {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Miss(_) => StatusCode::NOT_FOUND,
            CacheError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::OverCapacity { .. } => StatusCode::INSUFFICIENT_STORAGE,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Load { .. } | CacheError::Refill { .. } | CacheError::WriteBack { .. } => {
                StatusCode::BAD_GATEWAY
            }
            CacheError::LoadTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Config(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
