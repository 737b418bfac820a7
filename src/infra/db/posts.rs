use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{PostsRepo, RepoError},
    domain::entities::PostCreated,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    user_id: i64,
    created_at: OffsetDateTime,
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_post(&self, post_id: i64) -> Result<Option<PostCreated>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            "SELECT id, user_id, created_at FROM posts WHERE id = $1",
        )
        .bind(post_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| PostCreated::new(row.id, row.user_id, row.created_at)))
    }
}
