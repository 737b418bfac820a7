use async_trait::async_trait;

use crate::{
    application::repos::{CounterSource, RepoError},
    domain::entities::CounterKey,
};

use super::{PostgresRepositories, map_sqlx_error};

// Identifiers come from closed enums, never from input.
fn select_sql(key: &CounterKey) -> String {
    format!(
        "SELECT {column} FROM {table} WHERE id = $1",
        column = key.attribute().as_str(),
        table = key.kind().table(),
    )
}

fn adjust_sql(key: &CounterKey) -> String {
    format!(
        "UPDATE {table} SET {column} = {column} + $2 WHERE id = $1 RETURNING {column}",
        column = key.attribute().as_str(),
        table = key.kind().table(),
    )
}

#[async_trait]
impl CounterSource for PostgresRepositories {
    async fn load_counter(&self, key: CounterKey) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(&select_sql(&key))
            .bind(key.object_id())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)
    }

    async fn adjust_counter(&self, key: CounterKey, delta: i64) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(&adjust_sql(&key))
            .bind(key.object_id())
            .bind(delta)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_target_the_owning_table() {
        assert_eq!(
            select_sql(&CounterKey::comment_likes(1)),
            "SELECT likes_count FROM comments WHERE id = $1"
        );
        assert_eq!(
            adjust_sql(&CounterKey::post_comments(1)),
            "UPDATE posts SET comments_count = comments_count + $2 WHERE id = $1 RETURNING comments_count"
        );
    }
}
