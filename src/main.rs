use std::{process, sync::Arc};

use apalis::{
    layers::{WorkerBuilderExt, retry::RetryPolicy},
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use feedline::{
    application::{
        counters::CounterService,
        error::AppError,
        fanout::FanoutDispatcher,
        jobs::{
            FanoutBatchJobPayload, JobWorkerContext, execute_fanout_batch,
            process_fanout_batch_job,
        },
        newsfeeds::NewsFeedService,
        pagination::FeedCursor,
        repos::{FeedStore, PostsRepo},
        toggles::{FeedBackends, NEWSFEED_WIDE_COLUMN_SWITCH, StaticToggles, ToggleProvider},
    },
    cache::{BoundedListStore, CacheBackend, CacheConfig, CounterCache, MemoryCacheBackend},
    config,
    domain::{
        entities::{CounterKey, PostCreated},
        types::JobType,
    },
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        memory::{
            MemoryCounterSource, MemoryFeedStore, MemoryJobQueue, MemorySocialGraph,
            MemoryWideColumnTable,
        },
        redis_store::{self, RedisCacheBackend, RedisToggles},
        telemetry,
        widecolumn::WideColumnFeedStore,
    },
};
use redis::aio::ConnectionManager;
use serde_json::json;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SIMULATED_AUTHOR_ID: i64 = 1;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let transient = error.is_transient();
    if dispatcher::has_been_set() {
        error!(error = %error, transient, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, transient, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Fanout(args) => run_fanout(settings, args).await,
        config::Command::Feed(args) => run_feed(settings, args).await,
        config::Command::Toggle(args) => run_toggle(settings, args).await,
        config::Command::Simulate(args) => run_simulate(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let redis = connect_redis(&settings).await?;
    let newsfeeds = build_newsfeeds(&settings, &repositories, redis.as_ref());

    let context = JobWorkerContext {
        newsfeeds,
        graph: repositories.clone(),
        fanout_time_limit: settings.fanout.time_limit,
    };

    let storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::FanoutBatch.as_str()),
    );
    let retries = settings.fanout.max_attempts.get().saturating_sub(1) as usize;

    let fanout_worker = WorkerBuilder::new("fanout-batch-worker")
        .concurrency(settings.fanout.concurrency.get() as usize)
        .retry(RetryPolicy::retries(retries))
        .data(context)
        .backend(storage)
        .build_fn(process_fanout_batch_job);

    info!(
        target = "feedline::serve",
        concurrency = settings.fanout.concurrency.get(),
        batch_size = settings.fanout.batch_size.get(),
        "Starting fanout workers"
    );

    Monitor::new()
        .register(fanout_worker)
        .run_with_signal(tokio::signal::ctrl_c())
        .await
        .map_err(|err| AppError::unexpected(format!("job monitor stopped: {err}")))?;

    info!(target = "feedline::serve", "Fanout workers stopped");
    Ok(())
}

async fn run_fanout(settings: config::Settings, args: config::FanoutArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let redis = connect_redis(&settings).await?;
    let newsfeeds = build_newsfeeds(&settings, &repositories, redis.as_ref());

    let post = repositories
        .find_post(args.post_id)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?
        .ok_or_else(|| AppError::not_found(format!("post {}", args.post_id)))?;

    let dispatcher = FanoutDispatcher::new(
        newsfeeds,
        repositories.clone(),
        repositories.clone(),
        settings.fanout.batch_size.get(),
        settings.fanout.max_attempts.get() as i32,
    );
    let report = dispatcher.on_post_created(post).await?;

    info!(
        target = "feedline::fanout",
        post_id = report.post_id,
        followers = report.followers,
        jobs = report.job_ids.len(),
        "Fanout dispatched"
    );
    print_json(&json!(report))
}

async fn run_feed(settings: config::Settings, args: config::FeedArgs) -> Result<(), AppError> {
    let cursor = match args.cursor.as_deref() {
        Some(token) => Some(FeedCursor::decode(token).map_err(invalid_cursor)?),
        None => FeedCursor::from_query(args.created_at_gt.as_deref(), args.created_at_lt.as_deref())
            .map_err(invalid_cursor)?,
    };

    let repositories = init_repositories(&settings).await?;
    let redis = connect_redis(&settings).await?;
    let newsfeeds = build_newsfeeds(&settings, &repositories, redis.as_ref());

    let page = newsfeeds.list_feed(args.owner_id, cursor).await?;
    print_json(&json!({
        "owner_id": args.owner_id,
        "entries": page.entries,
        "has_next_page": page.has_next_page,
        "next_cursor": page.next_cursor().map(|cursor| cursor.encode()),
    }))
}

async fn run_toggle(settings: config::Settings, args: config::ToggleArgs) -> Result<(), AppError> {
    if settings.toggles.provider == config::ToggleBackend::Static {
        return Err(AppError::validation(
            "static toggles are read from configuration and cannot be flipped at runtime",
        ));
    }

    let conn = connect_redis(&settings)
        .await?
        .ok_or_else(|| InfraError::configuration("redis url is not configured"))?;
    let toggles = RedisToggles::new(conn);

    match args.state {
        config::SwitchState::On => toggles.turn_on(&args.name).await?,
        config::SwitchState::Off => toggles.turn_off(&args.name).await?,
    }

    info!(
        target = "feedline::toggle",
        switch = %args.name,
        on = args.state == config::SwitchState::On,
        "Switch flipped"
    );
    Ok(())
}

/// Publish posts from one author, drain the queue in-process and page
/// through a follower's feed.
async fn run_simulate(
    settings: config::Settings,
    args: config::SimulateArgs,
) -> Result<(), AppError> {
    let toggles: Arc<dyn ToggleProvider> =
        Arc::new(StaticToggles::new().with(NEWSFEED_WIDE_COLUMN_SWITCH, args.wide_column));
    let relational: Arc<dyn FeedStore> = Arc::new(MemoryFeedStore::new());
    let wide_column: Arc<dyn FeedStore> = Arc::new(WideColumnFeedStore::new(Arc::new(
        MemoryWideColumnTable::new(),
    )));
    let cache_backend: Arc<dyn CacheBackend> = Arc::new(MemoryCacheBackend::new());
    let cache_config = CacheConfig::from(&settings.cache);

    let newsfeeds = Arc::new(NewsFeedService::new(
        FeedBackends::new(toggles, relational, wide_column),
        BoundedListStore::new(cache_backend.clone(), cache_config.clone()),
        settings.feed.page_size.get(),
    ));

    let graph = Arc::new(MemorySocialGraph::new());
    graph.add_user(SIMULATED_AUTHOR_ID);
    let followers: Vec<i64> = (0..i64::from(args.followers))
        .map(|offset| SIMULATED_AUTHOR_ID + 1 + offset)
        .collect();
    for &follower in &followers {
        graph.follow(follower, SIMULATED_AUTHOR_ID);
    }

    let queue = Arc::new(MemoryJobQueue::new());
    let dispatcher = FanoutDispatcher::new(
        newsfeeds.clone(),
        graph.clone(),
        queue.clone(),
        settings.fanout.batch_size.get(),
        settings.fanout.max_attempts.get() as i32,
    );
    let context = JobWorkerContext {
        newsfeeds: newsfeeds.clone(),
        graph: graph.clone(),
        fanout_time_limit: settings.fanout.time_limit,
    };

    let counter_source = Arc::new(MemoryCounterSource::new());
    let counters = CounterService::new(
        CounterCache::new(cache_backend, cache_config),
        counter_source.clone(),
    );

    let started = OffsetDateTime::now_utc() - TimeDuration::hours(1);
    let mut written = 0usize;
    for index in 0..i64::from(args.posts) {
        let post_id = index + 1;
        let post = PostCreated::new(
            post_id,
            SIMULATED_AUTHOR_ID,
            started + TimeDuration::seconds(index),
        );
        counter_source.set(CounterKey::post_likes(post_id), 0);

        dispatcher.on_post_created(post).await?;
        written += drain_queue(&queue, &context).await?;

        for _ in 0..(post_id % 4) {
            counters.adjust(CounterKey::post_likes(post_id), 1).await?;
        }
    }

    let reader = followers.first().copied().unwrap_or(SIMULATED_AUTHOR_ID);
    let mut pages = 0usize;
    let mut seen = 0usize;
    let mut cursor = None;
    loop {
        let page = newsfeeds.list_feed(reader, cursor).await?;
        pages += 1;
        seen += page.entries.len();
        match page.next_cursor() {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let newest_likes = match args.posts {
        0 => 0,
        posts => counters.get(CounterKey::post_likes(i64::from(posts))).await?,
    };

    info!(
        target = "feedline::simulate",
        followers = followers.len(),
        posts = args.posts,
        fanout_entries = written,
        pages,
        "Simulation finished"
    );
    print_json(&json!({
        "backend": if args.wide_column { "wide_column" } else { "relational" },
        "followers": followers.len(),
        "posts": args.posts,
        "fanout_entries_written": written,
        "reader": reader,
        "pages_read": pages,
        "entries_read": seen,
        "newest_post_likes": newest_likes,
    }))
}

async fn drain_queue(queue: &MemoryJobQueue, context: &JobWorkerContext) -> Result<usize, AppError> {
    let mut written = 0;
    for (job_id, record) in queue.drain() {
        let payload: FanoutBatchJobPayload = serde_json::from_value(record.payload)
            .map_err(|err| AppError::unexpected(format!("job {job_id}: {err}")))?;
        written += execute_fanout_batch(context, &payload).await?;
    }
    Ok(written)
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn connect_redis(settings: &config::Settings) -> Result<Option<ConnectionManager>, AppError> {
    match settings.redis.url.as_deref() {
        Some(url) => Ok(Some(redis_store::connect(url).await?)),
        None => Ok(None),
    }
}

fn build_newsfeeds(
    settings: &config::Settings,
    repositories: &Arc<PostgresRepositories>,
    redis: Option<&ConnectionManager>,
) -> Arc<NewsFeedService> {
    let cache_backend: Arc<dyn CacheBackend> = match redis {
        Some(conn) => Arc::new(RedisCacheBackend::new(conn.clone())),
        None => {
            warn!(
                target = "feedline::startup",
                "redis url is not configured; feed windows are cached in process memory"
            );
            Arc::new(MemoryCacheBackend::new())
        }
    };

    let toggles: Arc<dyn ToggleProvider> = match (settings.toggles.provider, redis) {
        (config::ToggleBackend::Redis, Some(conn)) => Arc::new(RedisToggles::new(conn.clone())),
        (provider, _) => {
            if provider == config::ToggleBackend::Redis {
                warn!(
                    target = "feedline::startup",
                    "redis toggles requested without a redis url; using static switches"
                );
            }
            Arc::new(StaticToggles::new().with(
                NEWSFEED_WIDE_COLUMN_SWITCH,
                settings.toggles.newsfeed_wide_column,
            ))
        }
    };

    let relational: Arc<dyn FeedStore> = repositories.clone();
    let wide_column: Arc<dyn FeedStore> =
        Arc::new(WideColumnFeedStore::new(repositories.clone()));

    Arc::new(NewsFeedService::new(
        FeedBackends::new(toggles, relational, wide_column),
        BoundedListStore::new(cache_backend, CacheConfig::from(&settings.cache)),
        settings.feed.page_size.get(),
    ))
}

fn invalid_cursor(err: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("invalid cursor: {err}"))
}

fn print_json(value: &serde_json::Value) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
