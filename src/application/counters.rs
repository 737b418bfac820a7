//! Like and comment counters: durable first, cache second.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    application::repos::{CounterSource, RepoError},
    cache::{CacheError, CounterCache},
    domain::entities::CounterKey,
};

#[derive(Debug, Error)]
pub enum CounterError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Clone)]
pub struct CounterService {
    cache: CounterCache,
    source: Arc<dyn CounterSource>,
}

impl CounterService {
    pub fn new(cache: CounterCache, source: Arc<dyn CounterSource>) -> Self {
        Self { cache, source }
    }

    /// Apply `delta` to the durable counter, then to the cached one.
    pub async fn adjust(&self, key: CounterKey, delta: i64) -> Result<i64, CounterError> {
        self.source.adjust_counter(key, delta).await?;
        self.cache
            .bump(key, delta, || self.load(key))
            .await
    }

    /// Cache-side increment; the durable counter must already include it.
    pub async fn increment(&self, key: CounterKey) -> Result<i64, CounterError> {
        self.cache.increment(key, || self.load(key)).await
    }

    /// Cache-side decrement; the durable counter must already include it.
    pub async fn decrement(&self, key: CounterKey) -> Result<i64, CounterError> {
        self.cache.decrement(key, || self.load(key)).await
    }

    pub async fn get(&self, key: CounterKey) -> Result<i64, CounterError> {
        self.cache.get(key, || self.load(key)).await
    }

    async fn load(&self, key: CounterKey) -> Result<i64, CounterError> {
        Ok(self.source.load_counter(key).await?)
    }
}
