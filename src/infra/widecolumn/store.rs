use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    application::repos::{FeedRange, FeedStore, RepoError},
    domain::{
        entities::{FeedEntry, NewFeedEntry, from_unix_micros},
        error::DomainError,
        types::StorageKind,
    },
};

use super::{RowKey, RowScan, WideColumnTable, WideRow, owner_prefix};

#[derive(Debug, Serialize, Deserialize)]
struct FeedColumns {
    owner_id: i64,
    post_id: i64,
    created_at_us: i64,
}

/// [`FeedStore`] over a [`WideColumnTable`].
///
/// Scans run in reverse key order so rows come back newest first. The table
/// only offers inclusive bounds, so rows sitting exactly on a cursor are
/// fetched and then dropped.
#[derive(Clone)]
pub struct WideColumnFeedStore {
    table: Arc<dyn WideColumnTable>,
}

impl WideColumnFeedStore {
    pub fn new(table: Arc<dyn WideColumnTable>) -> Self {
        Self { table }
    }

    fn encode(entry: &NewFeedEntry) -> Result<WideRow, RepoError> {
        let key = RowKey::new(entry.owner_id, entry.created_at, entry.post_id)?;
        let columns = FeedColumns {
            owner_id: entry.owner_id,
            post_id: entry.post_id,
            created_at_us: key.micros,
        };
        Ok(WideRow {
            key: key.encode(),
            columns: serde_json::to_value(columns)
                .map_err(|err| RepoError::from_persistence(err.to_string()))?,
        })
    }

    fn decode(row: WideRow) -> Result<FeedEntry, RepoError> {
        let columns: FeedColumns = serde_json::from_value(row.columns).map_err(|err| {
            DomainError::invariant(format!("feed row `{}` is malformed: {err}", row.key))
        })?;
        Ok(FeedEntry {
            id: None,
            owner_id: columns.owner_id,
            post_id: columns.post_id,
            created_at: from_unix_micros(columns.created_at_us)?,
        })
    }

    fn scan_for(owner_id: i64, range: FeedRange) -> Result<RowScan, RepoError> {
        Ok(RowScan {
            prefix: owner_prefix(owner_id),
            start: range
                .before
                .map(|before| RowKey::ceiling(owner_id, before))
                .transpose()?,
            stop: range
                .after
                .map(|after| RowKey::floor(owner_id, after))
                .transpose()?,
            reverse: true,
            limit: None,
        })
    }
}

#[async_trait]
impl FeedStore for WideColumnFeedStore {
    fn kind(&self) -> StorageKind {
        StorageKind::WideColumn
    }

    async fn append(&self, entry: NewFeedEntry) -> Result<Option<FeedEntry>, RepoError> {
        let row = Self::encode(&entry)?;
        let written = self.table.put_absent(vec![row]).await?;
        Ok((!written.is_empty()).then(|| entry.into_entry(None)))
    }

    async fn append_batch(&self, entries: Vec<NewFeedEntry>) -> Result<Vec<FeedEntry>, RepoError> {
        let mut seen = HashSet::new();
        let mut keyed = Vec::with_capacity(entries.len());
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let row = Self::encode(&entry)?;
            if seen.insert(row.key.clone()) {
                keyed.push((row.key.clone(), entry));
                rows.push(row);
            }
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let written: HashSet<String> = self.table.put_absent(rows).await?.into_iter().collect();
        Ok(keyed
            .into_iter()
            .filter(|(key, _)| written.contains(key))
            .map(|(_, entry)| entry.into_entry(None))
            .collect())
    }

    async fn range_query(
        &self,
        owner_id: i64,
        range: FeedRange,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        let mut scan = Self::scan_for(owner_id, range)?;
        let boundaries = usize::from(range.after.is_some()) + usize::from(range.before.is_some());
        scan.limit = limit.map(|limit| limit + boundaries);

        loop {
            let rows = self.table.scan(&scan).await?;
            let exhausted = scan.limit.is_none_or(|fetched| rows.len() < fetched);

            let mut entries = Vec::with_capacity(rows.len());
            for row in rows {
                let entry = Self::decode(row)?;
                if range.contains(entry.created_at) {
                    entries.push(entry);
                }
            }

            match (limit, scan.limit) {
                (Some(limit), Some(fetched)) if entries.len() < limit && !exhausted => {
                    // more rows than expected sat on a boundary
                    scan.limit = Some(fetched * 2);
                }
                (Some(limit), _) => {
                    entries.truncate(limit);
                    return Ok(entries);
                }
                (None, _) => return Ok(entries),
            }
        }
    }

    async fn count(&self, owner_id: i64) -> Result<u64, RepoError> {
        self.table.count_prefix(&owner_prefix(owner_id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::{Duration, macros::datetime};

    use super::*;
    use crate::infra::memory::MemoryWideColumnTable;

    #[derive(Default)]
    struct CountingTable {
        inner: MemoryWideColumnTable,
        scans: AtomicUsize,
    }

    #[async_trait]
    impl WideColumnTable for CountingTable {
        async fn put_absent(&self, rows: Vec<WideRow>) -> Result<Vec<String>, RepoError> {
            self.inner.put_absent(rows).await
        }

        async fn scan(&self, scan: &RowScan) -> Result<Vec<WideRow>, RepoError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.scan(scan).await
        }

        async fn count_prefix(&self, prefix: &str) -> Result<u64, RepoError> {
            self.inner.count_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn rows_sharing_the_cursor_instant_are_skipped_by_widening_the_scan() {
        let table = Arc::new(CountingTable::default());
        let store = WideColumnFeedStore::new(table.clone());
        let at = datetime!(2024-05-01 9:00 UTC);

        let entries = vec![
            NewFeedEntry::new(7, 4, at - Duration::seconds(2)),
            NewFeedEntry::new(7, 5, at - Duration::seconds(1)),
            NewFeedEntry::new(7, 10, at),
            NewFeedEntry::new(7, 11, at),
            NewFeedEntry::new(7, 12, at),
        ];
        assert_eq!(store.append_batch(entries).await.expect("append").len(), 5);

        let page = store
            .range_query(7, FeedRange::before(at), Some(1))
            .await
            .expect("range");
        assert_eq!(page.iter().map(|e| e.post_id).collect::<Vec<_>>(), vec![5]);
        assert_eq!(table.scans.load(Ordering::SeqCst), 2);

        let page = store
            .range_query(7, FeedRange::before(at), None)
            .await
            .expect("range");
        assert_eq!(page.iter().map(|e| e.post_id).collect::<Vec<_>>(), vec![5, 4]);
    }

    #[tokio::test]
    async fn replayed_rows_are_not_reported_as_written() {
        let store = WideColumnFeedStore::new(Arc::new(MemoryWideColumnTable::new()));
        let entry = NewFeedEntry::new(3, 9, datetime!(2024-05-01 9:00 UTC));

        assert!(store.append(entry).await.expect("first").is_some());
        assert!(store.append(entry).await.expect("replay").is_none());
        assert!(store.append_batch(vec![entry, entry]).await.expect("batch").is_empty());
        assert_eq!(store.count(3).await.expect("count"), 1);
    }
}
