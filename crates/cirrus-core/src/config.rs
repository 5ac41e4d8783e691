//! Core configuration.
//!
//! The type is the contract: loading it from files or the environment is
//! the host process's concern.

use std::time::Duration;

use serde::Deserialize;

/// Tunables of the cache, refresh engine and scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct InfoConfig {
    /// Cadence of the long-lived (catalog, on-demand price) renewal.
    #[serde(default = "default_long_refresh_interval")]
    pub long_refresh_interval_secs: u64,

    /// Cadence of the short-lived (spot price) renewal.
    #[serde(default = "default_short_refresh_interval")]
    pub short_refresh_interval_secs: u64,

    /// TTL applied when a cache write does not specify one.
    #[serde(default = "default_cache_ttl")]
    pub cache_default_ttl_secs: u64,

    /// How often the background sweep removes expired entries.
    #[serde(default = "default_cache_cleanup_interval")]
    pub cache_cleanup_interval_secs: u64,

    /// Upper bound on any single adapter call; exceeding it counts as a
    /// transport error.
    #[serde(default = "default_adapter_call_timeout")]
    pub adapter_call_timeout_secs: u64,

    /// Enabled provider identifiers. Empty means every registered adapter.
    #[serde(default)]
    pub providers: Vec<String>,
}

fn default_long_refresh_interval() -> u64 {
    6 * 60 * 60
}

fn default_short_refresh_interval() -> u64 {
    60
}

fn default_cache_ttl() -> u64 {
    6 * 60 * 60
}

fn default_cache_cleanup_interval() -> u64 {
    10 * 60
}

fn default_adapter_call_timeout() -> u64 {
    10
}

impl Default for InfoConfig {
    fn default() -> Self {
        Self {
            long_refresh_interval_secs: default_long_refresh_interval(),
            short_refresh_interval_secs: default_short_refresh_interval(),
            cache_default_ttl_secs: default_cache_ttl(),
            cache_cleanup_interval_secs: default_cache_cleanup_interval(),
            adapter_call_timeout_secs: default_adapter_call_timeout(),
            providers: Vec::new(),
        }
    }
}

impl InfoConfig {
    pub fn long_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.long_refresh_interval_secs)
    }

    pub fn short_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.short_refresh_interval_secs)
    }

    pub fn cache_default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_default_ttl_secs)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_secs)
    }

    pub fn adapter_call_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_call_timeout_secs)
    }
}
