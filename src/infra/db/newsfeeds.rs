use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{FeedRange, FeedStore, RepoError},
    domain::{
        entities::{FeedEntry, NewFeedEntry},
        types::StorageKind,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct NewsfeedRow {
    id: i64,
    owner_id: i64,
    post_id: i64,
    created_at: OffsetDateTime,
}

impl From<NewsfeedRow> for FeedEntry {
    fn from(row: NewsfeedRow) -> Self {
        FeedEntry {
            id: Some(row.id),
            owner_id: row.owner_id,
            post_id: row.post_id,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl FeedStore for PostgresRepositories {
    fn kind(&self) -> StorageKind {
        StorageKind::Relational
    }

    async fn append(&self, entry: NewFeedEntry) -> Result<Option<FeedEntry>, RepoError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO newsfeeds (owner_id, post_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_id, post_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(entry.owner_id)
        .bind(entry.post_id)
        .bind(entry.created_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id.map(|id| entry.into_entry(Some(id))))
    }

    async fn append_batch(&self, entries: Vec<NewFeedEntry>) -> Result<Vec<FeedEntry>, RepoError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO newsfeeds (owner_id, post_id, created_at) ",
        );
        qb.push_values(entries.iter(), |mut row, entry| {
            row.push_bind(entry.owner_id)
                .push_bind(entry.post_id)
                .push_bind(entry.created_at);
        });
        qb.push(
            " ON CONFLICT (owner_id, post_id) DO NOTHING \
             RETURNING id, owner_id, post_id, created_at",
        );

        let rows = qb
            .build_query_as::<NewsfeedRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FeedEntry::from).collect())
    }

    async fn range_query(
        &self,
        owner_id: i64,
        range: FeedRange,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, owner_id, post_id, created_at FROM newsfeeds WHERE owner_id = ",
        );
        qb.push_bind(owner_id);
        if let Some(after) = range.after {
            qb.push(" AND created_at > ");
            qb.push_bind(after);
        }
        if let Some(before) = range.before {
            qb.push(" AND created_at < ");
            qb.push_bind(before);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = limit {
            let limit = i64::try_from(limit).map_err(|_| RepoError::InvalidInput {
                message: format!("limit {limit} is out of range"),
            })?;
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        let rows = qb
            .build_query_as::<NewsfeedRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FeedEntry::from).collect())
    }

    async fn count(&self, owner_id: i64) -> Result<u64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM newsfeeds WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(count.max(0) as u64)
    }
}
