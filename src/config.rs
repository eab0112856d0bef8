//! Configuration Module
//!
//! Handles loading cache and server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::StoreOptions;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries admitted by the count-bounded layer (0 = unbounded)
    pub max_entries: usize,
    /// Maximum total value bytes admitted by the memory-bounded layer (0 = unbounded)
    pub max_memory_bytes: usize,
    /// Default TTL in seconds for entries without explicit TTL (0 = never expire)
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background sweep interval in milliseconds (0 = no sweeper)
    pub sweep_interval_ms: u64,
    /// Maximum number of entries inspected per sweep tick
    pub sweep_batch: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Count bound (default: 1000)
    /// - `MAX_MEMORY_BYTES` - Memory bound in bytes (default: 0, disabled)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    /// - `SWEEP_BATCH` - Entries inspected per sweep tick (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            max_memory_bytes: env_or("MAX_MEMORY_BYTES", defaults.max_memory_bytes),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            sweep_batch: env_or("SWEEP_BATCH", defaults.sweep_batch),
        }
    }

    /// Default TTL applied by the HTTP front end.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    /// Store options derived from this configuration.
    pub fn store_options(&self) -> StoreOptions {
        let sweep_interval = match self.sweep_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        StoreOptions {
            sweep_interval,
            sweep_batch: self.sweep_batch.max(1),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_memory_bytes: 0,
            default_ttl: 300,
            server_port: 3000,
            sweep_interval_ms: 1000,
            sweep_batch: 256,
        }
    }
}
