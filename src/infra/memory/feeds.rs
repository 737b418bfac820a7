use std::{cmp::Reverse, collections::HashMap, sync::RwLock};

use async_trait::async_trait;

use crate::{
    application::repos::{FeedRange, FeedStore, RepoError},
    cache::{rw_read, rw_write},
    domain::{
        entities::{FeedEntry, NewFeedEntry},
        types::StorageKind,
    },
};

const TARGET: &str = "infra::memory::feeds";

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    by_owner: HashMap<i64, Vec<FeedEntry>>,
}

impl Table {
    fn insert(&mut self, entry: NewFeedEntry) -> Option<FeedEntry> {
        let rows = self.by_owner.entry(entry.owner_id).or_default();
        if rows.iter().any(|row| row.post_id == entry.post_id) {
            return None;
        }
        self.next_id += 1;
        let written = entry.into_entry(Some(self.next_id));
        rows.push(written.clone());
        Some(written)
    }
}

/// Relational-style store: surrogate ids and a unique `(owner, post)` pair.
#[derive(Debug, Default)]
pub struct MemoryFeedStore {
    table: RwLock<Table>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    fn kind(&self) -> StorageKind {
        StorageKind::Relational
    }

    async fn append(&self, entry: NewFeedEntry) -> Result<Option<FeedEntry>, RepoError> {
        Ok(rw_write(&self.table, TARGET, "append").insert(entry))
    }

    async fn append_batch(&self, entries: Vec<NewFeedEntry>) -> Result<Vec<FeedEntry>, RepoError> {
        let mut table = rw_write(&self.table, TARGET, "append_batch");
        Ok(entries
            .into_iter()
            .filter_map(|entry| table.insert(entry))
            .collect())
    }

    async fn range_query(
        &self,
        owner_id: i64,
        range: FeedRange,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        let table = rw_read(&self.table, TARGET, "range_query");
        let mut rows: Vec<FeedEntry> = table
            .by_owner
            .get(&owner_id)
            .map(|rows| {
                rows.iter()
                    .filter(|row| range.contains(row.created_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|row| Reverse((row.created_at, row.id)));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count(&self, owner_id: i64) -> Result<u64, RepoError> {
        let table = rw_read(&self.table, TARGET, "count");
        Ok(table.by_owner.get(&owner_id).map_or(0, Vec::len) as u64)
    }
}
