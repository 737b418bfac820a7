use async_trait::async_trait;

use crate::application::repos::{RepoError, SocialGraph};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl SocialGraph for PostgresRepositories {
    async fn follower_ids(&self, user_id: i64) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT from_user_id
            FROM friendships
            WHERE to_user_id = $1
            ORDER BY from_user_id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn existing_user_ids(&self, user_ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ANY($1)")
            .bind(user_ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
