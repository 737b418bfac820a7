use std::{collections::BTreeMap, ops::Bound, sync::RwLock};

use async_trait::async_trait;

use crate::{
    application::repos::RepoError,
    cache::{rw_read, rw_write},
    infra::widecolumn::{RowScan, WideColumnTable, WideRow},
};

const TARGET: &str = "infra::memory::wide_column";

/// Ordered map standing in for a column-store table.
#[derive(Debug, Default)]
pub struct MemoryWideColumnTable {
    rows: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryWideColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.rows, TARGET, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WideColumnTable for MemoryWideColumnTable {
    async fn put_absent(&self, rows: Vec<WideRow>) -> Result<Vec<String>, RepoError> {
        let mut table = rw_write(&self.rows, TARGET, "put_absent");
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            if table.contains_key(&row.key) {
                continue;
            }
            table.insert(row.key.clone(), row.columns);
            written.push(row.key);
        }
        Ok(written)
    }

    async fn scan(&self, scan: &RowScan) -> Result<Vec<WideRow>, RepoError> {
        let table = rw_read(&self.rows, TARGET, "scan");
        let range = table.range::<String, _>((Bound::Included(&scan.prefix), Bound::Unbounded));
        let matching = range
            .take_while(|(key, _)| key.starts_with(&scan.prefix))
            .filter(|(key, _)| scan.matches(key));

        let rows: Vec<WideRow> = if scan.reverse {
            let mut all: Vec<_> = matching.collect();
            all.reverse();
            all.into_iter()
                .take(scan.limit.unwrap_or(usize::MAX))
                .map(|(key, columns)| WideRow {
                    key: key.clone(),
                    columns: columns.clone(),
                })
                .collect()
        } else {
            matching
                .take(scan.limit.unwrap_or(usize::MAX))
                .map(|(key, columns)| WideRow {
                    key: key.clone(),
                    columns: columns.clone(),
                })
                .collect()
        };
        Ok(rows)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, RepoError> {
        let table = rw_read(&self.rows, TARGET, "count_prefix");
        let count = table
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(key: &str) -> WideRow {
        WideRow {
            key: key.to_string(),
            columns: json!({ "k": key }),
        }
    }

    #[tokio::test]
    async fn put_absent_reports_only_new_keys() {
        let table = MemoryWideColumnTable::new();

        let first = table.put_absent(vec![row("a:1"), row("a:2")]).await.expect("put");
        let second = table.put_absent(vec![row("a:2"), row("a:3")]).await.expect("put");

        assert_eq!(first, vec!["a:1", "a:2"]);
        assert_eq!(second, vec!["a:3"]);
        assert_eq!(table.len(), 3);
    }

    #[tokio::test]
    async fn reverse_scan_respects_prefix_bounds_and_limit() {
        let table = MemoryWideColumnTable::new();
        table
            .put_absent(vec![row("1:1"), row("1:2"), row("1:3"), row("1:4"), row("12:9")])
            .await
            .expect("put");

        let scan = RowScan {
            prefix: "1:".into(),
            start: Some("1:3".into()),
            stop: None,
            reverse: true,
            limit: Some(2),
        };
        let keys: Vec<String> = table
            .scan(&scan)
            .await
            .expect("scan")
            .into_iter()
            .map(|row| row.key)
            .collect();

        assert_eq!(keys, vec!["1:3", "1:2"]);
        assert_eq!(table.count_prefix("1:").await.expect("count"), 4);
    }
}
