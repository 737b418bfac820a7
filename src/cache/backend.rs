use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Key-value primitives the feed cache is built from.
///
/// Lists are stored most-recent-first. Every multi-step mutation is applied
/// atomically by the backend.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Full contents of a list; empty when the key is absent.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// Replace a list wholesale and set its expiry.
    async fn list_replace(
        &self,
        key: &str,
        values: Vec<String>,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Left-push onto an existing list and trim it to `max_len`.
    ///
    /// Returns `false` without writing when the key does not exist.
    async fn list_push_front(
        &self,
        key: &str,
        value: String,
        max_len: usize,
    ) -> Result<bool, CacheError>;

    async fn counter_get(&self, key: &str) -> Result<Option<i64>, CacheError>;

    async fn counter_set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), CacheError>;

    /// Add `delta` to an existing counter; `None` when the key is absent.
    async fn counter_incr(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every key.
    async fn clear(&self) -> Result<(), CacheError>;
}
