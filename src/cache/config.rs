//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_LIST_LENGTH_LIMIT: usize = 1000;
const DEFAULT_KEY_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Cache configuration from `feedline.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries kept in one cached feed window.
    pub list_length_limit: usize,
    /// Expiry applied when a window or counter is populated.
    pub key_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_length_limit: DEFAULT_LIST_LENGTH_LIMIT,
            key_ttl_seconds: DEFAULT_KEY_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            list_length_limit: settings.list_length_limit.get(),
            key_ttl_seconds: settings.key_ttl.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Window capacity, never below one.
    pub fn capacity(&self) -> usize {
        self.list_length_limit.max(1)
    }

    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_seconds.max(1))
    }
}
