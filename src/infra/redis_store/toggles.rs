use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::info;

use crate::application::toggles::{ToggleError, ToggleProvider};

const PERCENT_FIELD: &str = "percent";
const FULL_ROLLOUT: i64 = 100;

fn switch_key(name: &str) -> String {
    format!("gatekeeper:{name}")
}

/// Percentage-rollout switches stored as Redis hashes. A switch counts as on
/// only at full rollout.
#[derive(Clone)]
pub struct RedisToggles {
    conn: ConnectionManager,
}

impl RedisToggles {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn turn_on(&self, name: &str) -> Result<(), ToggleError> {
        self.set_percent(name, FULL_ROLLOUT).await
    }

    pub async fn turn_off(&self, name: &str) -> Result<(), ToggleError> {
        self.set_percent(name, 0).await
    }

    async fn set_percent(&self, name: &str, percent: i64) -> Result<(), ToggleError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(switch_key(name), PERCENT_FIELD, percent)
            .await
            .map_err(ToggleError::store)?;
        info!(switch = name, percent, "Switch updated");
        Ok(())
    }
}

#[async_trait]
impl ToggleProvider for RedisToggles {
    async fn is_on(&self, name: &str) -> Result<bool, ToggleError> {
        let mut conn = self.conn.clone();
        let percent = conn
            .hget::<_, _, Option<i64>>(switch_key(name), PERCENT_FIELD)
            .await
            .map_err(ToggleError::store)?;
        Ok(percent.is_some_and(|value| value >= FULL_ROLLOUT))
    }

    async fn set(&self, name: &str, on: bool) -> Result<(), ToggleError> {
        if on {
            self.turn_on(name).await
        } else {
            self.turn_off(name).await
        }
    }
}
