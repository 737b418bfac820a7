use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use feedline::application::fanout::FanoutDispatcher;
use feedline::application::jobs::{FanoutBatchJobPayload, JobWorkerContext, execute_fanout_batch};
use feedline::application::newsfeeds::NewsFeedService;
use feedline::application::repos::{FeedRange, FeedStore};
use feedline::application::toggles::{
    FeedBackends, NEWSFEED_WIDE_COLUMN_SWITCH, StaticToggles, ToggleProvider,
};
use feedline::cache::{BoundedListStore, CacheBackend, CacheConfig, CacheError, MemoryCacheBackend};
use feedline::domain::entities::PostCreated;
use feedline::domain::types::JobType;
use feedline::infra::memory::{
    MemoryFeedStore, MemoryJobQueue, MemorySocialGraph, MemoryWideColumnTable,
};
use feedline::infra::widecolumn::WideColumnFeedStore;
use time::{Duration, OffsetDateTime, macros::datetime};

const AUTHOR: i64 = 1;

/// Memory cache whose next head push can be made to fail.
#[derive(Default)]
struct FlakyCache {
    inner: MemoryCacheBackend,
    fail_next_push: AtomicBool,
}

impl FlakyCache {
    fn fail_next_push(&self) {
        self.fail_next_push.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheBackend for FlakyCache {
    async fn list_range(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.inner.list_range(key).await
    }

    async fn list_replace(
        &self,
        key: &str,
        values: Vec<String>,
        ttl: std::time::Duration,
    ) -> Result<(), CacheError> {
        self.inner.list_replace(key, values, ttl).await
    }

    async fn list_push_front(
        &self,
        key: &str,
        value: String,
        max_len: usize,
    ) -> Result<bool, CacheError> {
        if self.fail_next_push.swap(false, Ordering::SeqCst) {
            return Err(CacheError::backend("connection reset"));
        }
        self.inner.list_push_front(key, value, max_len).await
    }

    async fn counter_get(&self, key: &str) -> Result<Option<i64>, CacheError> {
        self.inner.counter_get(key).await
    }

    async fn counter_set(
        &self,
        key: &str,
        value: i64,
        ttl: std::time::Duration,
    ) -> Result<(), CacheError> {
        self.inner.counter_set(key, value, ttl).await
    }

    async fn counter_incr(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError> {
        self.inner.counter_incr(key, delta).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }
}

struct Harness {
    graph: Arc<MemorySocialGraph>,
    queue: Arc<MemoryJobQueue>,
    toggles: Arc<StaticToggles>,
    relational: Arc<MemoryFeedStore>,
    wide_column: Arc<WideColumnFeedStore>,
    newsfeeds: Arc<NewsFeedService>,
    dispatcher: FanoutDispatcher,
    context: JobWorkerContext,
}

fn harness(batch_size: usize) -> Harness {
    harness_with_cache(batch_size, Arc::new(MemoryCacheBackend::new()))
}

fn harness_with_cache(batch_size: usize, cache: Arc<dyn CacheBackend>) -> Harness {
    let graph = Arc::new(MemorySocialGraph::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let toggles = Arc::new(StaticToggles::new());
    let relational = Arc::new(MemoryFeedStore::new());
    let wide_column = Arc::new(WideColumnFeedStore::new(Arc::new(
        MemoryWideColumnTable::new(),
    )));
    let config = CacheConfig {
        list_length_limit: 5,
        ..Default::default()
    };

    let newsfeeds = Arc::new(NewsFeedService::new(
        FeedBackends::new(toggles.clone(), relational.clone(), wide_column.clone()),
        BoundedListStore::new(cache, config),
        2,
    ));
    let dispatcher = FanoutDispatcher::new(
        newsfeeds.clone(),
        graph.clone(),
        queue.clone(),
        batch_size,
        5,
    );
    let context = JobWorkerContext {
        newsfeeds: newsfeeds.clone(),
        graph: graph.clone(),
        fanout_time_limit: std::time::Duration::from_secs(5),
    };

    graph.add_user(AUTHOR);

    Harness {
        graph,
        queue,
        toggles,
        relational,
        wide_column,
        newsfeeds,
        dispatcher,
        context,
    }
}

impl Harness {
    fn followers(&self, ids: impl IntoIterator<Item = i64>) {
        for id in ids {
            self.graph.follow(id, AUTHOR);
        }
    }

    fn take_payloads(&self) -> Vec<FanoutBatchJobPayload> {
        self.queue
            .drain()
            .into_iter()
            .map(|(_, record)| {
                assert_eq!(record.job_type, JobType::FanoutBatch);
                serde_json::from_value(record.payload).expect("fanout payload")
            })
            .collect()
    }

    async fn run_jobs(&self) -> usize {
        let mut written = 0;
        for payload in self.take_payloads() {
            written += execute_fanout_batch(&self.context, &payload)
                .await
                .expect("fanout batch");
        }
        written
    }
}

fn post(post_id: i64, at: OffsetDateTime) -> PostCreated {
    PostCreated::new(post_id, AUTHOR, at)
}

#[tokio::test]
async fn author_sees_post_before_any_batch_runs() {
    let h = harness(10);
    h.followers(2..=4);

    let report = h
        .dispatcher
        .on_post_created(post(100, datetime!(2024-03-01 12:00 UTC)))
        .await
        .expect("dispatch");

    assert!(report.author_entry.is_some());
    assert_eq!(report.followers, 3);

    let page = h.newsfeeds.list_feed(AUTHOR, None).await.expect("author feed");
    assert_eq!(page.entries.first().map(|e| e.post_id), Some(100));

    let follower = h.newsfeeds.list_feed(2, None).await.expect("follower feed");
    assert!(follower.entries.is_empty());
}

#[tokio::test]
async fn followers_are_split_into_batches_and_all_receive_the_post() {
    let h = harness(2);
    h.followers(2..=6);

    let report = h
        .dispatcher
        .on_post_created(post(7, datetime!(2024-03-01 12:00 UTC)))
        .await
        .expect("dispatch");
    assert_eq!(report.job_ids.len(), 3);

    let payloads = h.take_payloads();
    let sizes: Vec<usize> = payloads.iter().map(|p| p.follower_ids.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    for payload in &payloads {
        execute_fanout_batch(&h.context, payload)
            .await
            .expect("fanout batch");
    }

    for follower in 2..=6 {
        let page = h.newsfeeds.list_feed(follower, None).await.expect("feed");
        assert_eq!(
            page.entries.iter().map(|e| e.post_id).collect::<Vec<_>>(),
            vec![7],
            "follower {follower}"
        );
    }
}

#[tokio::test]
async fn author_is_never_a_batch_target() {
    let h = harness(10);
    h.followers([2, 3]);
    h.graph.follow(AUTHOR, AUTHOR);

    h.dispatcher
        .on_post_created(post(9, datetime!(2024-03-01 12:00 UTC)))
        .await
        .expect("dispatch");

    let payloads = h.take_payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].follower_ids, vec![2, 3]);
}

#[tokio::test]
async fn redelivered_batches_write_nothing_new() {
    let h = harness(10);
    h.followers(2..=4);

    h.dispatcher
        .on_post_created(post(11, datetime!(2024-03-01 12:00 UTC)))
        .await
        .expect("dispatch");
    let payloads = h.take_payloads();

    let first = execute_fanout_batch(&h.context, &payloads[0])
        .await
        .expect("first delivery");
    let second = execute_fanout_batch(&h.context, &payloads[0])
        .await
        .expect("redelivery");

    assert_eq!(first, 3);
    assert_eq!(second, 0);
    assert_eq!(h.relational.count(2).await.expect("count"), 1);

    let window = h.newsfeeds.get_cached_newsfeeds(2).await.expect("window");
    assert_eq!(window.len(), 1);
}

#[tokio::test]
async fn deleted_followers_are_skipped_without_failing_the_batch() {
    let h = harness(10);
    h.followers(2..=4);
    h.graph.remove_user(3);

    h.dispatcher
        .on_post_created(post(12, datetime!(2024-03-01 12:00 UTC)))
        .await
        .expect("dispatch");
    let written = h.run_jobs().await;

    assert_eq!(written, 2);
    assert_eq!(h.relational.count(3).await.expect("count"), 0);
    assert_eq!(h.relational.count(4).await.expect("count"), 1);
}

#[tokio::test]
async fn posts_without_followers_enqueue_nothing() {
    let h = harness(10);

    let report = h
        .dispatcher
        .on_post_created(post(13, datetime!(2024-03-01 12:00 UTC)))
        .await
        .expect("dispatch");

    assert_eq!(report.followers, 0);
    assert!(report.job_ids.is_empty());
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn switch_routes_writes_and_reads_to_the_wide_column_store() {
    let h = harness(10);
    h.followers([2]);
    h.toggles
        .set(NEWSFEED_WIDE_COLUMN_SWITCH, true)
        .await
        .expect("flip switch");

    h.dispatcher
        .on_post_created(post(21, datetime!(2024-03-01 12:00 UTC)))
        .await
        .expect("dispatch");
    h.run_jobs().await;

    assert_eq!(h.wide_column.count(2).await.expect("wide count"), 1);
    assert_eq!(h.relational.count(2).await.expect("relational count"), 0);

    let rows = h
        .wide_column
        .range_query(2, FeedRange::default(), None)
        .await
        .expect("scan");
    assert_eq!(rows[0].post_id, 21);
    assert!(rows[0].id.is_none());

    let page = h.newsfeeds.list_feed(AUTHOR, None).await.expect("author feed");
    assert_eq!(page.entries[0].post_id, 21);
}

#[tokio::test]
async fn newest_post_leads_every_follower_feed() {
    let h = harness(10);
    h.followers(2..=3);
    let base = datetime!(2024-03-01 12:00 UTC);

    for id in 1..=8 {
        h.dispatcher
            .on_post_created(post(id, base + Duration::minutes(id)))
            .await
            .expect("dispatch");
        h.run_jobs().await;
    }

    let window = h.newsfeeds.get_cached_newsfeeds(3).await.expect("window");
    assert_eq!(
        window.iter().map(|e| e.post_id).collect::<Vec<_>>(),
        vec![8, 7, 6, 5, 4]
    );
    assert_eq!(h.relational.count(3).await.expect("count"), 8);
}

#[tokio::test]
async fn batch_retried_after_cache_failure_still_reaches_follower_window() {
    let cache = Arc::new(FlakyCache::default());
    let h = harness_with_cache(10, cache.clone());
    h.followers([2]);
    let base = datetime!(2024-03-01 12:00 UTC);

    h.dispatcher
        .on_post_created(post(1, base))
        .await
        .expect("dispatch");
    h.run_jobs().await;
    let window = h.newsfeeds.get_cached_newsfeeds(2).await.expect("window");
    assert_eq!(window.len(), 1);

    h.dispatcher
        .on_post_created(post(2, base + Duration::minutes(1)))
        .await
        .expect("dispatch");
    let payloads = h.take_payloads();

    cache.fail_next_push();
    execute_fanout_batch(&h.context, &payloads[0])
        .await
        .expect_err("cache push fails after the durable write");
    let retried = execute_fanout_batch(&h.context, &payloads[0])
        .await
        .expect("retry");
    assert_eq!(retried, 0);

    let page = h.newsfeeds.list_feed(2, None).await.expect("follower feed");
    assert_eq!(
        page.entries.iter().map(|e| e.post_id).collect::<Vec<_>>(),
        vec![2, 1]
    );
}

#[tokio::test]
async fn author_retry_after_cache_failure_still_sees_post_first() {
    let cache = Arc::new(FlakyCache::default());
    let h = harness_with_cache(10, cache.clone());
    let base = datetime!(2024-03-01 12:00 UTC);

    h.dispatcher
        .on_post_created(post(1, base))
        .await
        .expect("dispatch");

    cache.fail_next_push();
    let later = post(2, base + Duration::minutes(1));
    h.dispatcher
        .on_post_created(later)
        .await
        .expect_err("author push fails");
    let report = h.dispatcher.on_post_created(later).await.expect("retry");
    assert!(report.author_entry.is_none());

    let page = h.newsfeeds.list_feed(AUTHOR, None).await.expect("author feed");
    assert_eq!(
        page.entries.iter().map(|e| e.post_id).collect::<Vec<_>>(),
        vec![2, 1]
    );
}
