//! In-process cache backend with the same semantics as the Redis one.

use std::{
    collections::{HashMap, VecDeque},
    sync::RwLock,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::{
    backend::{CacheBackend, CacheError},
    lock::{rw_read, rw_write},
};

const TARGET: &str = "cache::memory";

#[derive(Debug, Clone)]
enum Value {
    List(VecDeque<String>),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.slots, TARGET, "len")
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrong_type(key: &str) -> CacheError {
        CacheError::backend(format!("key `{key}` holds a value of another type"))
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn list_range(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let slots = rw_read(&self.slots, TARGET, "list_range");
        match slots.get(key) {
            Some(slot) if slot.is_live(Instant::now()) => match &slot.value {
                Value::List(items) => Ok(items.iter().cloned().collect()),
                Value::Counter(_) => Err(Self::wrong_type(key)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn list_replace(
        &self,
        key: &str,
        values: Vec<String>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut slots = rw_write(&self.slots, TARGET, "list_replace");
        if values.is_empty() {
            slots.remove(key);
            return Ok(());
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: Value::List(values.into()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn list_push_front(
        &self,
        key: &str,
        value: String,
        max_len: usize,
    ) -> Result<bool, CacheError> {
        let mut slots = rw_write(&self.slots, TARGET, "list_push_front");
        let now = Instant::now();
        let Some(slot) = slots.get_mut(key).filter(|slot| slot.is_live(now)) else {
            return Ok(false);
        };
        let Value::List(items) = &mut slot.value else {
            return Err(Self::wrong_type(key));
        };
        items.push_front(value);
        items.truncate(max_len);
        Ok(true)
    }

    async fn counter_get(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let slots = rw_read(&self.slots, TARGET, "counter_get");
        match slots.get(key) {
            Some(slot) if slot.is_live(Instant::now()) => match slot.value {
                Value::Counter(value) => Ok(Some(value)),
                Value::List(_) => Err(Self::wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn counter_set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), CacheError> {
        rw_write(&self.slots, TARGET, "counter_set").insert(
            key.to_string(),
            Slot {
                value: Value::Counter(value),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn counter_incr(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError> {
        let mut slots = rw_write(&self.slots, TARGET, "counter_incr");
        let now = Instant::now();
        let Some(slot) = slots.get_mut(key).filter(|slot| slot.is_live(now)) else {
            return Ok(None);
        };
        let Value::Counter(value) = &mut slot.value else {
            return Err(Self::wrong_type(key));
        };
        *value += delta;
        Ok(Some(*value))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        rw_write(&self.slots, TARGET, "delete").remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        rw_write(&self.slots, TARGET, "clear").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn push_front_requires_existing_list() {
        let backend = MemoryCacheBackend::new();

        assert!(
            !backend
                .list_push_front("feed", "a".into(), 3)
                .await
                .expect("push")
        );
        assert!(backend.list_range("feed").await.expect("range").is_empty());

        backend
            .list_replace("feed", vec!["b".into(), "c".into()], TTL)
            .await
            .expect("replace");
        assert!(
            backend
                .list_push_front("feed", "a".into(), 3)
                .await
                .expect("push")
        );
        assert!(
            backend
                .list_push_front("feed", "z".into(), 3)
                .await
                .expect("push")
        );

        assert_eq!(
            backend.list_range("feed").await.expect("range"),
            vec!["z", "a", "b"]
        );
    }

    #[tokio::test]
    async fn expired_keys_behave_as_absent() {
        let backend = MemoryCacheBackend::new();
        backend
            .list_replace("feed", vec!["a".into()], Duration::ZERO)
            .await
            .expect("replace");
        backend
            .counter_set("count", 3, Duration::ZERO)
            .await
            .expect("set");

        assert!(backend.list_range("feed").await.expect("range").is_empty());
        assert_eq!(backend.counter_incr("count", 1).await.expect("incr"), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn counters_increment_only_when_present() {
        let backend = MemoryCacheBackend::new();

        assert_eq!(backend.counter_incr("count", 1).await.expect("incr"), None);
        backend.counter_set("count", 5, TTL).await.expect("set");
        assert_eq!(backend.counter_incr("count", -2).await.expect("incr"), Some(3));
        assert_eq!(backend.counter_get("count").await.expect("get"), Some(3));

        backend.clear().await.expect("clear");
        assert_eq!(backend.counter_get("count").await.expect("get"), None);
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let backend = MemoryCacheBackend::new();
        backend.counter_set("key", 1, TTL).await.expect("set");

        assert!(backend.list_range("key").await.is_err());
    }
}
