use std::sync::Arc;

use feedline::application::newsfeeds::NewsFeedService;
use feedline::application::pagination::{FeedCursor, FeedPage};
use feedline::application::repos::{FeedRange, FeedStore};
use feedline::application::toggles::{
    FeedBackends, NEWSFEED_WIDE_COLUMN_SWITCH, StaticToggles, ToggleProvider,
};
use feedline::cache::{BoundedListStore, CacheConfig, MemoryCacheBackend};
use feedline::domain::entities::{FeedEntry, NewFeedEntry};
use feedline::infra::memory::{MemoryFeedStore, MemoryWideColumnTable};
use feedline::infra::widecolumn::WideColumnFeedStore;
use time::{Duration, OffsetDateTime, macros::datetime};

const OWNER: i64 = 42;
const BASE: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);

struct Feed {
    toggles: Arc<StaticToggles>,
    relational: Arc<MemoryFeedStore>,
    wide_column: Arc<WideColumnFeedStore>,
    service: NewsFeedService,
}

fn feed(capacity: usize, page_size: usize) -> Feed {
    let toggles = Arc::new(StaticToggles::new());
    let relational = Arc::new(MemoryFeedStore::new());
    let wide_column = Arc::new(WideColumnFeedStore::new(Arc::new(
        MemoryWideColumnTable::new(),
    )));
    let config = CacheConfig {
        list_length_limit: capacity,
        ..Default::default()
    };
    let service = NewsFeedService::new(
        FeedBackends::new(toggles.clone(), relational.clone(), wide_column.clone()),
        BoundedListStore::new(Arc::new(MemoryCacheBackend::new()), config),
        page_size,
    );
    Feed {
        toggles,
        relational,
        wide_column,
        service,
    }
}

fn entry(post_id: i64) -> NewFeedEntry {
    NewFeedEntry::new(OWNER, post_id, BASE + Duration::minutes(post_id))
}

fn ids(page: &FeedPage<FeedEntry>) -> Vec<i64> {
    page.entries.iter().map(|e| e.post_id).collect()
}

async fn seed(feed: &Feed, count: i64) {
    for post_id in 1..=count {
        feed.service.create(entry(post_id)).await.expect("create");
    }
}

async fn walk(service: &NewsFeedService) -> Vec<Vec<i64>> {
    let mut pages = Vec::new();
    let mut cursor = None;
    loop {
        let page = service.list_feed(OWNER, cursor).await.expect("page");
        pages.push(ids(&page));
        match page.next_cursor() {
            Some(next) => cursor = Some(next),
            None => return pages,
        }
    }
}

#[tokio::test]
async fn window_then_store_fallback_scenario() {
    let feed = feed(5, 2);
    seed(&feed, 7).await;

    let first = feed.service.list_feed(OWNER, None).await.expect("page 1");
    assert_eq!(ids(&first), vec![7, 6]);
    assert!(first.has_next_page);

    let second = feed
        .service
        .list_feed(OWNER, first.next_cursor())
        .await
        .expect("page 2");
    assert_eq!(ids(&second), vec![5, 4]);
    assert!(second.has_next_page);

    let third = feed
        .service
        .list_feed(OWNER, second.next_cursor())
        .await
        .expect("page 3");
    assert_eq!(ids(&third), vec![3, 2]);
    assert!(third.has_next_page);

    let fourth = feed
        .service
        .list_feed(OWNER, third.next_cursor())
        .await
        .expect("page 4");
    assert_eq!(ids(&fourth), vec![1]);
    assert!(!fourth.has_next_page);
}

#[tokio::test]
async fn paging_to_exhaustion_matches_a_full_scan() {
    for page_size in 1..=5 {
        let feed = feed(5, page_size);
        seed(&feed, 13).await;

        let paged: Vec<i64> = walk(&feed.service).await.into_iter().flatten().collect();
        let full: Vec<i64> = feed
            .relational
            .range_query(OWNER, FeedRange::default(), None)
            .await
            .expect("full scan")
            .into_iter()
            .map(|e| e.post_id)
            .collect();

        assert_eq!(paged, full, "page size {page_size}");
        assert_eq!(full, (1..=13).rev().collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn cleared_cache_serves_the_same_pages() {
    let feed = feed(5, 3);
    seed(&feed, 9).await;

    let warm = walk(&feed.service).await;
    feed.service.clear_cache().await.expect("clear");
    let cold = walk(&feed.service).await;

    assert_eq!(warm, cold);
    assert_eq!(warm, vec![vec![9, 8, 7], vec![6, 5, 4], vec![3, 2, 1]]);
}

#[tokio::test]
async fn after_cursor_returns_everything_newer_without_more() {
    let feed = feed(5, 2);
    seed(&feed, 6).await;

    let cursor = FeedCursor::after(BASE + Duration::minutes(3));
    let page = feed.service.list_feed(OWNER, Some(cursor)).await.expect("page");

    assert_eq!(ids(&page), vec![6, 5, 4]);
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn before_cursor_past_the_oldest_entry_is_empty() {
    let feed = feed(5, 2);
    seed(&feed, 3).await;

    let page = feed
        .service
        .list_feed(OWNER, Some(FeedCursor::before(BASE)))
        .await
        .expect("page");

    assert!(page.entries.is_empty());
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn empty_feed_has_a_single_empty_page() {
    let feed = feed(5, 2);

    let pages = walk(&feed.service).await;
    assert_eq!(pages, vec![Vec::<i64>::new()]);
}

#[tokio::test]
async fn wide_column_engine_pages_like_the_relational_engine() {
    let relational = feed(4, 3);
    seed(&relational, 10).await;

    let wide = feed(4, 3);
    wide.toggles
        .set(NEWSFEED_WIDE_COLUMN_SWITCH, true)
        .await
        .expect("flip switch");
    seed(&wide, 10).await;

    assert_eq!(wide.wide_column.count(OWNER).await.expect("count"), 10);
    assert_eq!(wide.relational.count(OWNER).await.expect("count"), 0);
    assert_eq!(walk(&relational.service).await, walk(&wide.service).await);
}

#[tokio::test]
async fn wide_column_range_bounds_are_exclusive() {
    let feed = feed(5, 2);
    feed.toggles
        .set(NEWSFEED_WIDE_COLUMN_SWITCH, true)
        .await
        .expect("flip switch");
    seed(&feed, 6).await;

    let range = FeedRange {
        after: Some(BASE + Duration::minutes(2)),
        before: Some(BASE + Duration::minutes(5)),
    };
    let rows = feed
        .wide_column
        .range_query(OWNER, range, None)
        .await
        .expect("range");

    assert_eq!(rows.iter().map(|e| e.post_id).collect::<Vec<_>>(), vec![4, 3]);
}

#[tokio::test]
async fn cursor_tokens_survive_a_round_trip_through_the_feed() {
    let feed = feed(5, 2);
    seed(&feed, 4).await;

    let first = feed.service.list_feed(OWNER, None).await.expect("page 1");
    let token = first.next_cursor().expect("more pages").encode();
    let decoded = FeedCursor::decode(&token).expect("decode");

    let second = feed.service.list_feed(OWNER, Some(decoded)).await.expect("page 2");
    assert_eq!(ids(&second), vec![2, 1]);
}
