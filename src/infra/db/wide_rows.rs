use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::{
    application::repos::RepoError,
    infra::widecolumn::{RowScan, WideColumnTable, WideRow},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct WideRowRecord {
    row_key: String,
    columns: serde_json::Value,
}

/// Escape `%`, `_` and `\` so a key prefix can be used in LIKE.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

// `wide_rows.row_key` uses the "C" collation, so comparisons are bytewise.
#[async_trait]
impl WideColumnTable for PostgresRepositories {
    async fn put_absent(&self, rows: Vec<WideRow>) -> Result<Vec<String>, RepoError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO wide_rows (row_key, columns) ");
        qb.push_values(rows, |mut row, wide| {
            row.push_bind(wide.key).push_bind(wide.columns);
        });
        qb.push(" ON CONFLICT (row_key) DO NOTHING RETURNING row_key");

        qb.build_query_scalar::<String>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn scan(&self, scan: &RowScan) -> Result<Vec<WideRow>, RepoError> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT row_key, columns FROM wide_rows WHERE row_key LIKE ");
        qb.push_bind(like_prefix(&scan.prefix));

        let (lower, upper) = if scan.reverse {
            (scan.stop.as_ref(), scan.start.as_ref())
        } else {
            (scan.start.as_ref(), scan.stop.as_ref())
        };
        if let Some(lower) = lower {
            qb.push(" AND row_key >= ");
            qb.push_bind(lower.clone());
        }
        if let Some(upper) = upper {
            qb.push(" AND row_key <= ");
            qb.push_bind(upper.clone());
        }
        qb.push(if scan.reverse {
            " ORDER BY row_key DESC"
        } else {
            " ORDER BY row_key ASC"
        });
        if let Some(limit) = scan.limit {
            let limit = i64::try_from(limit).map_err(|_| RepoError::InvalidInput {
                message: format!("scan limit {limit} is out of range"),
            })?;
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        let records = qb
            .build_query_as::<WideRowRecord>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(records
            .into_iter()
            .map(|record| WideRow {
                key: record.row_key,
                columns: record.columns,
            })
            .collect())
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, RepoError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM wide_rows WHERE row_key LIKE $1")
                .bind(like_prefix(prefix))
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(count.max(0) as u64)
    }
}
