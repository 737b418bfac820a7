//! Cached object counters with backfill from the source of truth.

use std::{future::Future, sync::Arc};

use metrics::counter;
use tracing::debug;

use super::{
    backend::{CacheBackend, CacheError},
    config::CacheConfig,
    keys,
};
use crate::domain::entities::CounterKey;

const METRIC_COUNTER_HIT: &str = "feedline_counter_cache_hit_total";
const METRIC_COUNTER_BACKFILL: &str = "feedline_counter_cache_backfill_total";

/// Counters such as `Post.likes_count:42`.
///
/// Callers must update the durable value before calling `increment` or
/// `decrement`: on a miss the cache is seeded from the durable value, which
/// then already includes the change, and is returned without bumping again.
#[derive(Clone)]
pub struct CounterCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl CounterCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    pub async fn increment<F, Fut, E>(&self, key: CounterKey, backfill: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
        E: From<CacheError>,
    {
        self.bump(key, 1, backfill).await
    }

    pub async fn decrement<F, Fut, E>(&self, key: CounterKey, backfill: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
        E: From<CacheError>,
    {
        self.bump(key, -1, backfill).await
    }

    pub async fn get<F, Fut, E>(&self, key: CounterKey, backfill: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
        E: From<CacheError>,
    {
        let cache_key = keys::counter_key(&key);
        if let Some(value) = self.backend.counter_get(&cache_key).await? {
            counter!(METRIC_COUNTER_HIT).increment(1);
            return Ok(value);
        }
        self.backfill(&cache_key, backfill).await
    }

    /// Apply `delta` to a cached counter, seeding it on a miss.
    pub async fn bump<F, Fut, E>(&self, key: CounterKey, delta: i64, backfill: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
        E: From<CacheError>,
    {
        let cache_key = keys::counter_key(&key);
        if let Some(value) = self.backend.counter_incr(&cache_key, delta).await? {
            counter!(METRIC_COUNTER_HIT).increment(1);
            return Ok(value);
        }
        self.backfill(&cache_key, backfill).await
    }

    pub async fn invalidate(&self, key: CounterKey) -> Result<(), CacheError> {
        self.backend.delete(&keys::counter_key(&key)).await
    }

    async fn backfill<F, Fut, E>(&self, cache_key: &str, backfill: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
        E: From<CacheError>,
    {
        let value = backfill().await?;
        self.backend
            .counter_set(cache_key, value, self.config.key_ttl())
            .await?;
        counter!(METRIC_COUNTER_BACKFILL).increment(1);
        debug!(
            target = "feedline::cache::counters",
            key = cache_key,
            value,
            "counter backfilled"
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;
    use crate::cache::MemoryCacheBackend;

    fn cache() -> CounterCache {
        CounterCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default())
    }

    #[tokio::test]
    async fn miss_seeds_from_source_without_double_counting() {
        let cache = cache();
        let durable = AtomicI64::new(0);
        let key = CounterKey::post_likes(1);

        // durable write first, then the cache
        durable.fetch_add(1, Ordering::SeqCst);
        let value = cache
            .increment(key, || async {
                Ok::<_, CacheError>(durable.load(Ordering::SeqCst))
            })
            .await
            .expect("increment");
        assert_eq!(value, 1);

        durable.fetch_add(1, Ordering::SeqCst);
        let value = cache
            .increment(key, || async {
                Ok::<_, CacheError>(durable.load(Ordering::SeqCst))
            })
            .await
            .expect("increment");
        assert_eq!(value, 2);

        durable.fetch_sub(1, Ordering::SeqCst);
        let value = cache
            .decrement(key, || async { Ok::<_, CacheError>(-100) })
            .await
            .expect("decrement");
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn get_backfills_once() {
        let cache = cache();
        let key = CounterKey::post_comments(9);

        let first = cache
            .get(key, || async { Ok::<_, CacheError>(4) })
            .await
            .expect("get");
        let second = cache
            .get(key, || async { Ok::<_, CacheError>(99) })
            .await
            .expect("get");

        assert_eq!((first, second), (4, 4));
    }

    #[tokio::test]
    async fn invalidated_counter_is_reloaded() {
        let cache = cache();
        let key = CounterKey::comment_likes(3);

        cache
            .get(key, || async { Ok::<_, CacheError>(1) })
            .await
            .expect("get");
        cache.invalidate(key).await.expect("invalidate");
        let value = cache
            .get(key, || async { Ok::<_, CacheError>(7) })
            .await
            .expect("get");

        assert_eq!(value, 7);
    }
}
