use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "feedline_cache_window_hit_total",
            Unit::Count,
            "Feed window reads answered from the cache."
        );
        describe_counter!(
            "feedline_cache_window_miss_total",
            Unit::Count,
            "Feed window reads that found no cached list."
        );
        describe_counter!(
            "feedline_cache_window_load_total",
            Unit::Count,
            "Feed windows rebuilt from the backing store."
        );
        describe_counter!(
            "feedline_cache_window_push_total",
            Unit::Count,
            "Entries prepended to an existing feed window."
        );
        describe_counter!(
            "feedline_counter_cache_hit_total",
            Unit::Count,
            "Counter reads answered from the cache."
        );
        describe_counter!(
            "feedline_counter_cache_backfill_total",
            Unit::Count,
            "Counters seeded from durable storage after a miss."
        );
        describe_counter!(
            "feedline_feed_page_total",
            Unit::Count,
            "Feed pages served, labelled by source and backend."
        );
        describe_counter!(
            "feedline_fanout_batches_enqueued_total",
            Unit::Count,
            "Fanout batch jobs handed to the queue."
        );
        describe_counter!(
            "feedline_fanout_entries_written_total",
            Unit::Count,
            "Follower feed entries written by fanout batches."
        );
        describe_counter!(
            "feedline_fanout_batch_failed_total",
            Unit::Count,
            "Fanout batches that returned an error."
        );
        describe_histogram!(
            "feedline_fanout_batch_ms",
            Unit::Milliseconds,
            "Fanout batch execution latency in milliseconds."
        );
    });
}
