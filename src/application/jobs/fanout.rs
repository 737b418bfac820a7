use std::{collections::HashSet, time::Instant};

use apalis::prelude::{Data, Error as ApalisError};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, error, info};

use crate::{
    application::{
        fanout::FanoutError,
        newsfeeds::NewsFeedService,
        repos::{JobsRepo, RepoError, SocialGraph},
    },
    domain::{entities::NewFeedEntry, types::JobType},
};

use super::{
    context::{JobWorkerContext, job_failed},
    queue::enqueue_job,
};

const METRIC_FANOUT_ENTRIES_WRITTEN: &str = "feedline_fanout_entries_written_total";
const METRIC_FANOUT_BATCH_MS: &str = "feedline_fanout_batch_ms";
const METRIC_FANOUT_BATCH_FAILED: &str = "feedline_fanout_batch_failed_total";

/// One slice of a post's followers to fan out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutBatchJobPayload {
    pub post_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub follower_ids: Vec<i64>,
}

pub async fn enqueue_fanout_batch_job<J: JobsRepo + ?Sized>(
    repo: &J,
    payload: &FanoutBatchJobPayload,
    max_attempts: i32,
) -> Result<String, RepoError> {
    enqueue_job(repo, JobType::FanoutBatch, payload, None, max_attempts, 0).await
}

/// Write the post into every listed follower's feed.
///
/// Followers that no longer exist are skipped. Returns the number of entries
/// that were newly written; a replayed batch writes nothing.
pub async fn run_fanout_batch(
    newsfeeds: &NewsFeedService,
    graph: &dyn SocialGraph,
    payload: &FanoutBatchJobPayload,
) -> Result<usize, FanoutError> {
    let existing: HashSet<i64> = graph
        .existing_user_ids(&payload.follower_ids)
        .await?
        .into_iter()
        .collect();

    let entries: Vec<NewFeedEntry> = payload
        .follower_ids
        .iter()
        .filter(|id| existing.contains(*id))
        .map(|&follower_id| NewFeedEntry::new(follower_id, payload.post_id, payload.created_at))
        .collect();

    let skipped = payload.follower_ids.len() - entries.len();
    if skipped > 0 {
        debug!(
            target = "feedline::application::jobs::run_fanout_batch",
            post_id = payload.post_id,
            skipped,
            "followers no longer exist"
        );
    }

    let written = newsfeeds.batch_create(entries).await?;
    Ok(written.len())
}

/// [`run_fanout_batch`] under the worker's hard time limit.
pub async fn execute_fanout_batch(
    context: &JobWorkerContext,
    payload: &FanoutBatchJobPayload,
) -> Result<usize, FanoutError> {
    let limit = context.fanout_time_limit;
    tokio::time::timeout(
        limit,
        run_fanout_batch(&context.newsfeeds, context.graph.as_ref(), payload),
    )
    .await
    .map_err(|_| FanoutError::TimedOut { limit })?
}

pub async fn process_fanout_batch_job(
    payload: FanoutBatchJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let started_at = Instant::now();

    match execute_fanout_batch(ctx, &payload).await {
        Ok(written) => {
            counter!(METRIC_FANOUT_ENTRIES_WRITTEN).increment(written as u64);
            histogram!(METRIC_FANOUT_BATCH_MS)
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            info!(
                target = "feedline::application::jobs::process_fanout_batch_job",
                post_id = payload.post_id,
                followers = payload.follower_ids.len(),
                written,
                "fanout batch complete"
            );
            Ok(())
        }
        Err(err) => {
            counter!(METRIC_FANOUT_BATCH_FAILED).increment(1);
            error!(
                target = "feedline::application::jobs::process_fanout_batch_job",
                post_id = payload.post_id,
                followers = payload.follower_ids.len(),
                error = %err,
                "fanout batch failed"
            );
            Err(job_failed(err))
        }
    }
}
