use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

use crate::application::toggles::NEWSFEED_WIDE_COLUMN_SWITCH;

/// Command-line arguments for the feedline binary.
#[derive(Debug, Parser)]
#[command(
    name = "feedline",
    version,
    about = "Newsfeed fanout workers and feed tooling"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FEEDLINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the fanout batch workers.
    Serve(Box<ServeArgs>),
    /// Fan out an existing post to its author's followers.
    Fanout(FanoutArgs),
    /// Print one page of a user's newsfeed as JSON.
    Feed(FeedArgs),
    /// Flip a runtime switch.
    Toggle(ToggleArgs),
    /// Run the whole pipeline in-process against in-memory engines.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ConnectionOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub connections: ConnectionOverrides,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the fanout worker concurrency.
    #[arg(long = "fanout-concurrency", value_name = "COUNT")]
    pub fanout_concurrency: Option<u32>,

    /// Override the number of followers per fanout batch.
    #[arg(long = "fanout-batch-size", value_name = "COUNT")]
    pub fanout_batch_size: Option<u64>,

    /// Override the per-owner cached window length.
    #[arg(long = "cache-list-length-limit", value_name = "COUNT")]
    pub cache_list_length_limit: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct FanoutArgs {
    #[command(flatten)]
    pub connections: ConnectionOverrides,

    /// Identifier of the stored post to distribute.
    #[arg(value_name = "POST_ID")]
    pub post_id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    #[command(flatten)]
    pub connections: ConnectionOverrides,

    /// Owner whose feed is read.
    #[arg(value_name = "OWNER_ID")]
    pub owner_id: i64,

    /// Opaque cursor returned by a previous page.
    #[arg(long, value_name = "TOKEN", conflicts_with_all = ["created_at_lt", "created_at_gt"])]
    pub cursor: Option<String>,

    /// Only entries older than this instant (RFC 3339 or unix microseconds).
    #[arg(long = "created-at-lt", value_name = "INSTANT")]
    pub created_at_lt: Option<String>,

    /// Only entries newer than this instant (RFC 3339 or unix microseconds).
    #[arg(long = "created-at-gt", value_name = "INSTANT")]
    pub created_at_gt: Option<String>,

    /// Override the page size.
    #[arg(long = "page-size", value_name = "COUNT")]
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SwitchState {
    On,
    Off,
}

#[derive(Debug, Args, Clone)]
pub struct ToggleArgs {
    #[command(flatten)]
    pub connections: ConnectionOverrides,

    /// Desired switch state.
    #[arg(value_enum, value_name = "STATE")]
    pub state: SwitchState,

    /// Switch name.
    #[arg(long, value_name = "NAME", default_value = NEWSFEED_WIDE_COLUMN_SWITCH)]
    pub name: String,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Number of followers of the simulated author.
    #[arg(long, default_value_t = 25)]
    pub followers: u32,

    /// Number of posts the author publishes.
    #[arg(long, default_value_t = 12)]
    pub posts: u32,

    /// Serve feeds from the wide-column engine instead of the relational one.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub wide_column: bool,
}
