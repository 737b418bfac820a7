//! Bounded most-recent-first lists with lazy population.

use std::{future::Future, sync::Arc};

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use super::{
    backend::{CacheBackend, CacheError},
    config::CacheConfig,
};

const METRIC_WINDOW_HIT: &str = "feedline_cache_window_hit_total";
const METRIC_WINDOW_MISS: &str = "feedline_cache_window_miss_total";
const METRIC_WINDOW_LOAD: &str = "feedline_cache_window_load_total";
const METRIC_WINDOW_PUSH: &str = "feedline_cache_window_push_total";

/// Per-key windows of serialized objects, capped at the configured length.
///
/// A window is always a prefix of the underlying ordered collection: it is
/// created by one bulk load of the newest `capacity` objects and only grows
/// at the head afterwards, dropping from the tail once full.
#[derive(Clone)]
pub struct BoundedListStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl BoundedListStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Return the cached window for `key`, loading it on a miss.
    ///
    /// `lazy_load` receives the capacity and must return at most that many
    /// objects, newest first. An empty load leaves the key absent.
    pub async fn load<T, F, Fut, E>(&self, key: &str, lazy_load: F) -> Result<Vec<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        E: From<CacheError>,
    {
        let cached = self.backend.list_range(key).await?;
        if !cached.is_empty() {
            counter!(METRIC_WINDOW_HIT).increment(1);
            return cached
                .iter()
                .map(|raw| serde_json::from_str(raw).map_err(|err| CacheError::from(err).into()))
                .collect();
        }

        counter!(METRIC_WINDOW_MISS).increment(1);
        let capacity = self.capacity();
        let mut objects = lazy_load(capacity).await?;
        objects.truncate(capacity);
        if objects.is_empty() {
            return Ok(objects);
        }

        let values = objects
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CacheError::from)?;
        self.backend
            .list_replace(key, values, self.config.key_ttl())
            .await?;
        counter!(METRIC_WINDOW_LOAD).increment(1);
        debug!(
            target = "feedline::cache::store",
            key,
            loaded = objects.len(),
            "window populated"
        );

        Ok(objects)
    }

    /// Put `object` at the head of the window for `key`.
    ///
    /// An existing window is pushed and trimmed in one atomic step. A missing
    /// window is loaded in full instead, which already includes `object` when
    /// it has been stored durably. Returns `false` when the window was loaded
    /// rather than pushed.
    pub async fn push<T, F, Fut, E>(&self, key: &str, object: &T, lazy_load: F) -> Result<bool, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        E: From<CacheError>,
    {
        let value = serde_json::to_string(object).map_err(CacheError::from)?;
        if self
            .backend
            .list_push_front(key, value, self.capacity())
            .await?
        {
            counter!(METRIC_WINDOW_PUSH).increment(1);
            return Ok(true);
        }

        self.load::<T, F, Fut, E>(key, lazy_load).await.map(|_| false)
    }

    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.backend.delete(key).await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear().await
    }
}
