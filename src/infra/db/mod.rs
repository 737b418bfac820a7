//! Postgres-backed repository implementations.

mod counters;
mod jobs;
mod newsfeeds;
mod posts;
mod social;
mod util;
mod wide_rows;

pub use util::map_sqlx_error;

use std::sync::Arc;

use apalis_sql::postgres::PostgresStorage;
use sqlx::{
    migrate::MigrateError,
    postgres::{PgPool, PgPoolOptions},
    query,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Apply the queue schema and the feed schema.
    ///
    /// Both migrators share `_sqlx_migrations`, so each ignores versions that
    /// belong to the other.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
        let mut queue = PostgresStorage::<()>::migrations();
        queue.set_ignore_missing(true);
        queue.run(pool).await?;

        let mut feed = sqlx::migrate!("./migrations");
        feed.set_ignore_missing(true);
        feed.run(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
