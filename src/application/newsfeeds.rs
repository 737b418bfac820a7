//! Newsfeed reads and writes through the bounded window cache.

use std::collections::{BTreeMap, HashSet};

use metrics::counter;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    application::{
        pagination::{FeedCursor, FeedPage, PaginationError, paginate_cached, paginate_store},
        repos::{FeedRange, FeedStore, RepoError},
        toggles::{FeedBackends, ToggleError},
    },
    cache::{BoundedListStore, CacheError, keys},
    domain::entities::{FeedEntry, NewFeedEntry},
};

const METRIC_FEED_PAGE: &str = "feedline_feed_page_total";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    InvalidCursor(#[from] PaginationError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Toggle(#[from] ToggleError),
}

/// Feed entries stored durably and mirrored into per-owner cached windows.
#[derive(Clone)]
pub struct NewsFeedService {
    backends: FeedBackends,
    windows: BoundedListStore,
    page_size: usize,
}

impl NewsFeedService {
    pub fn new(backends: FeedBackends, windows: BoundedListStore, page_size: usize) -> Self {
        Self {
            backends,
            windows,
            page_size: page_size.max(1),
        }
    }

    pub fn backends(&self) -> &FeedBackends {
        &self.backends
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn window_capacity(&self) -> usize {
        self.windows.capacity()
    }

    /// The cached window of `owner_id`, loaded from the active store on a miss.
    pub async fn get_cached_newsfeeds(&self, owner_id: i64) -> Result<Vec<FeedEntry>, FeedError> {
        let store = self.backends.select().await?;
        self.cached_window(store.as_ref(), owner_id).await
    }

    pub async fn push_newsfeed_to_cache(&self, entry: &FeedEntry) -> Result<(), FeedError> {
        let store = self.backends.select().await?;
        self.push_to_window(store.as_ref(), entry).await?;
        Ok(())
    }

    /// Store one entry and put it into the owner's window.
    ///
    /// Returns `None` when the owner already had the post. The owner's window
    /// is dropped in that case: an earlier attempt may have stored the entry
    /// without reaching the cache, and the next read reloads it.
    pub async fn create(&self, entry: NewFeedEntry) -> Result<Option<FeedEntry>, FeedError> {
        let store = self.backends.select().await?;
        let Some(written) = store.append(entry).await? else {
            debug!(
                target = "feedline::application::newsfeeds",
                owner_id = entry.owner_id,
                post_id = entry.post_id,
                "feed entry already present, resetting window"
            );
            self.reset_window(entry.owner_id).await?;
            return Ok(None);
        };
        self.push_to_window(store.as_ref(), &written).await?;
        Ok(Some(written))
    }

    /// Store many entries in one bulk write, then push each new one into its
    /// owner's window.
    ///
    /// Owners with an entry that was already stored get their window dropped
    /// instead, the same way [`Self::create`] handles a replay.
    pub async fn batch_create(
        &self,
        entries: Vec<NewFeedEntry>,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.backends.select().await?;
        let requested: Vec<(i64, i64)> = entries
            .iter()
            .map(|entry| (entry.owner_id, entry.post_id))
            .collect();
        let written = store.append_batch(entries).await?;

        let fresh: HashSet<(i64, i64)> = written
            .iter()
            .map(|entry| (entry.owner_id, entry.post_id))
            .collect();
        let stale: HashSet<i64> = requested
            .into_iter()
            .filter(|pair| !fresh.contains(pair))
            .map(|(owner_id, _)| owner_id)
            .collect();
        for &owner_id in &stale {
            self.reset_window(owner_id).await?;
        }

        let mut by_owner: BTreeMap<i64, Vec<&FeedEntry>> = BTreeMap::new();
        for entry in written.iter().filter(|entry| !stale.contains(&entry.owner_id)) {
            by_owner.entry(entry.owner_id).or_default().push(entry);
        }
        for entries in by_owner.values_mut() {
            entries.sort_by_key(|entry| entry.created_at);
            for entry in entries.iter() {
                // a load already brought in the rest of this owner's entries
                if !self.push_to_window(store.as_ref(), entry).await? {
                    break;
                }
            }
        }
        Ok(written)
    }

    /// One page of `owner_id`'s feed, served from the cached window when it
    /// can answer and from the active store otherwise.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_feed(
        &self,
        owner_id: i64,
        cursor: Option<FeedCursor>,
    ) -> Result<FeedPage<FeedEntry>, FeedError> {
        let store = self.backends.select().await?;
        let window = self.cached_window(store.as_ref(), owner_id).await?;

        if let Some(page) =
            paginate_cached(&window, cursor, self.page_size, self.windows.capacity())
        {
            counter!(METRIC_FEED_PAGE, "source" => "cache").increment(1);
            return Ok(page);
        }

        counter!(
            METRIC_FEED_PAGE,
            "source" => "store",
            "backend" => store.kind().as_str()
        )
        .increment(1);
        let page = paginate_store(store.as_ref(), owner_id, cursor, self.page_size).await?;
        Ok(page)
    }

    pub async fn clear_cache(&self) -> Result<(), FeedError> {
        self.windows.clear().await?;
        Ok(())
    }

    async fn cached_window(
        &self,
        store: &dyn FeedStore,
        owner_id: i64,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        let key = keys::newsfeed_list_key(owner_id);
        self.windows
            .load(&key, |limit| load_recent(store, owner_id, limit))
            .await
    }

    async fn push_to_window(
        &self,
        store: &dyn FeedStore,
        entry: &FeedEntry,
    ) -> Result<bool, FeedError> {
        let owner_id = entry.owner_id;
        let key = keys::newsfeed_list_key(owner_id);
        self.windows
            .push(&key, entry, |limit| load_recent(store, owner_id, limit))
            .await
    }

    async fn reset_window(&self, owner_id: i64) -> Result<(), FeedError> {
        self.windows
            .invalidate(&keys::newsfeed_list_key(owner_id))
            .await?;
        Ok(())
    }
}

async fn load_recent(
    store: &dyn FeedStore,
    owner_id: i64,
    limit: usize,
) -> Result<Vec<FeedEntry>, FeedError> {
    let entries = store
        .range_query(owner_id, FeedRange::default(), Some(limit))
        .await?;
    Ok(entries)
}
