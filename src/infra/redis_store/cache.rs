use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};

use crate::cache::{CacheBackend, CacheError};

/// INCRBY that leaves absent keys absent, so a cold counter is seeded from
/// durable storage instead of starting at `delta`.
const INCR_IF_EXISTS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
";

#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: ConnectionManager,
    incr_if_exists: Script,
}

impl RedisCacheBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_if_exists: Script::new(INCR_IF_EXISTS),
        }
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn list_range(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.lrange::<_, Vec<String>>(key, 0, -1)
            .await
            .map_err(CacheError::backend)
    }

    async fn list_replace(
        &self,
        key: &str,
        values: Vec<String>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !values.is_empty() {
            pipe.rpush(key, values)
                .ignore()
                .expire(key, ttl_secs(ttl))
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(CacheError::backend)
    }

    async fn list_push_front(
        &self,
        key: &str,
        value: String,
        max_len: usize,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let stop = isize::try_from(max_len.max(1)).unwrap_or(isize::MAX) - 1;
        let (len,): (i64,) = redis::pipe()
            .atomic()
            .lpush_exists(key, value)
            .ltrim(key, 0, stop)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(CacheError::backend)?;
        Ok(len > 0)
    }

    async fn counter_get(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<i64>>(key)
            .await
            .map_err(CacheError::backend)
    }

    async fn counter_set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let secs = u64::try_from(ttl_secs(ttl)).unwrap_or(u64::MAX);
        conn.set_ex::<_, _, ()>(key, value, secs)
            .await
            .map_err(CacheError::backend)
    }

    async fn counter_incr(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn.clone();
        self.incr_if_exists
            .key(key)
            .arg(delta)
            .invoke_async::<_, Option<i64>>(&mut conn)
            .await
            .map_err(CacheError::backend)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(CacheError::backend)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(CacheError::backend)
    }
}
