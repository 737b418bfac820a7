use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    application::repos::{CounterSource, RepoError},
    domain::entities::CounterKey,
};

/// Durable-side counters kept in a concurrent map. Unknown objects are
/// reported as missing, matching the relational source.
#[derive(Debug, Default)]
pub struct MemoryCounterSource {
    values: DashMap<CounterKey, i64>,
}

impl MemoryCounterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: CounterKey, value: i64) {
        self.values.insert(key, value);
    }
}

#[async_trait]
impl CounterSource for MemoryCounterSource {
    async fn load_counter(&self, key: CounterKey) -> Result<i64, RepoError> {
        self.values
            .get(&key)
            .map(|value| *value)
            .ok_or(RepoError::NotFound)
    }

    async fn adjust_counter(&self, key: CounterKey, delta: i64) -> Result<i64, RepoError> {
        let mut value = self.values.get_mut(&key).ok_or(RepoError::NotFound)?;
        *value += delta;
        Ok(*value)
    }
}
