//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "feedline";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_LIST_LENGTH_LIMIT: u64 = 1000;
const DEFAULT_KEY_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_PAGE_SIZE: u64 = 20;
const DEFAULT_FANOUT_BATCH_SIZE: u64 = 1000;
/// One batch becomes a single multi-row INSERT with four binds per row.
const MAX_FANOUT_BATCH_SIZE: u64 = 10_000;
const DEFAULT_FANOUT_TIME_LIMIT_SECS: u64 = 60 * 60;
const DEFAULT_FANOUT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_FANOUT_CONCURRENCY: u32 = 4;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
    pub feed: FeedSettings,
    pub fanout: FanoutSettings,
    pub toggles: ToggleSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub list_length_limit: NonZeroUsize,
    pub key_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct FanoutSettings {
    pub batch_size: NonZeroUsize,
    pub time_limit: Duration,
    pub max_attempts: NonZeroU32,
    pub concurrency: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleBackend {
    Redis,
    Static,
}

#[derive(Debug, Clone)]
pub struct ToggleSettings {
    pub provider: ToggleBackend,
    /// Initial state of the wide-column switch for the static provider.
    pub newsfeed_wide_column: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FEEDLINE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Fanout(args)) => raw.apply_connection_overrides(&args.connections),
        Some(Command::Feed(args)) => {
            raw.apply_connection_overrides(&args.connections);
            if let Some(page_size) = args.page_size {
                raw.feed.page_size = Some(page_size);
            }
        }
        Some(Command::Toggle(args)) => raw.apply_connection_overrides(&args.connections),
        Some(Command::Simulate(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    cache: RawCacheSettings,
    feed: RawFeedSettings,
    fanout: RawFanoutSettings,
    toggles: RawToggleSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_connection_overrides(&overrides.connections);

        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(value) = overrides.fanout_concurrency {
            self.fanout.concurrency = Some(value);
        }
        if let Some(value) = overrides.fanout_batch_size {
            self.fanout.batch_size = Some(value);
        }
        if let Some(value) = overrides.cache_list_length_limit {
            self.cache.list_length_limit = Some(value);
        }
    }

    fn apply_connection_overrides(&mut self, overrides: &ConnectionOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            redis,
            cache,
            feed,
            fanout,
            toggles,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let redis = build_redis_settings(redis);
        let cache = build_cache_settings(cache)?;
        let feed = build_feed_settings(feed, &cache)?;
        let fanout = build_fanout_settings(fanout)?;
        let toggles = build_toggle_settings(toggles)?;

        Ok(Self {
            logging,
            database,
            redis,
            cache,
            feed,
            fanout,
            toggles,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url: trimmed(database.url),
        max_connections: non_zero_u32(max_connections.into(), "database.max_connections")?,
    })
}

fn build_redis_settings(redis: RawRedisSettings) -> RedisSettings {
    RedisSettings {
        url: trimmed(redis.url),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let limit = cache.list_length_limit.unwrap_or(DEFAULT_LIST_LENGTH_LIMIT);
    let list_length_limit = non_zero_usize(limit, "cache.list_length_limit")?;

    let ttl_secs = cache.key_ttl_seconds.unwrap_or(DEFAULT_KEY_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.key_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        list_length_limit,
        key_ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_feed_settings(
    feed: RawFeedSettings,
    cache: &CacheSettings,
) -> Result<FeedSettings, LoadError> {
    let page_size = non_zero_usize(
        feed.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        "feed.page_size",
    )?;
    if page_size > cache.list_length_limit {
        return Err(LoadError::invalid(
            "feed.page_size",
            format!(
                "must not exceed cache.list_length_limit ({})",
                cache.list_length_limit
            ),
        ));
    }

    Ok(FeedSettings { page_size })
}

fn build_fanout_settings(fanout: RawFanoutSettings) -> Result<FanoutSettings, LoadError> {
    let batch_size_value = fanout.batch_size.unwrap_or(DEFAULT_FANOUT_BATCH_SIZE);
    if batch_size_value > MAX_FANOUT_BATCH_SIZE {
        return Err(LoadError::invalid(
            "fanout.batch_size",
            format!("must not exceed {MAX_FANOUT_BATCH_SIZE}"),
        ));
    }
    let batch_size = non_zero_usize(batch_size_value, "fanout.batch_size")?;

    let time_limit_secs = fanout
        .time_limit_seconds
        .unwrap_or(DEFAULT_FANOUT_TIME_LIMIT_SECS);
    if time_limit_secs == 0 {
        return Err(LoadError::invalid(
            "fanout.time_limit_seconds",
            "must be greater than zero",
        ));
    }

    let max_attempts = fanout.max_attempts.unwrap_or(DEFAULT_FANOUT_MAX_ATTEMPTS);
    let max_attempts = non_zero_u32(max_attempts.into(), "fanout.max_attempts")?;
    if i32::try_from(max_attempts.get()).is_err() {
        return Err(LoadError::invalid(
            "fanout.max_attempts",
            "value exceeds supported range for i32",
        ));
    }

    let concurrency = fanout.concurrency.unwrap_or(DEFAULT_FANOUT_CONCURRENCY);

    Ok(FanoutSettings {
        batch_size,
        time_limit: Duration::from_secs(time_limit_secs),
        max_attempts,
        concurrency: non_zero_u32(concurrency.into(), "fanout.concurrency")?,
    })
}

fn build_toggle_settings(toggles: RawToggleSettings) -> Result<ToggleSettings, LoadError> {
    let provider = match toggles.provider.as_deref().map(str::trim) {
        None | Some("redis") => ToggleBackend::Redis,
        Some("static") => ToggleBackend::Static,
        Some(other) => {
            return Err(LoadError::invalid(
                "toggles.provider",
                format!("unknown provider `{other}` (expected `redis` or `static`)"),
            ));
        }
    };

    Ok(ToggleSettings {
        provider,
        newsfeed_wide_column: toggles.newsfeed_wide_column.unwrap_or(false),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    list_length_limit: Option<u64>,
    key_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFanoutSettings {
    batch_size: Option<u64>,
    time_limit_seconds: Option<u64>,
    max_attempts: Option<u32>,
    concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawToggleSettings {
    provider: Option<String>,
    newsfeed_wide_column: Option<bool>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
