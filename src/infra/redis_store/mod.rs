//! Redis-backed cache lists, counters and feature switches.

mod cache;
mod toggles;

use redis::aio::ConnectionManager;

use crate::infra::error::InfraError;

pub use cache::RedisCacheBackend;
pub use toggles::RedisToggles;

/// Opens a reconnecting connection shared by every Redis adapter.
pub async fn connect(url: &str) -> Result<ConnectionManager, InfraError> {
    let client = redis::Client::open(url)
        .map_err(|err| InfraError::cache(format!("invalid redis url: {err}")))?;
    ConnectionManager::new(client)
        .await
        .map_err(|err| InfraError::cache(format!("failed to connect to redis: {err}")))
}
