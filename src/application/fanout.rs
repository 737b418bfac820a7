//! Fanout-on-write for newly created posts.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
    application::{
        jobs::{FanoutBatchJobPayload, enqueue_fanout_batch_job},
        newsfeeds::{FeedError, NewsFeedService},
        repos::{JobsRepo, RepoError, SocialGraph},
    },
    domain::entities::{FeedEntry, PostCreated},
};

const METRIC_FANOUT_BATCHES_ENQUEUED: &str = "feedline_fanout_batches_enqueued_total";

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("fanout batch exceeded its time limit of {limit:?}")]
    TimedOut { limit: Duration },
}

/// What `on_post_created` did synchronously.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutReport {
    pub post_id: i64,
    /// `None` when the author already had the post in their feed.
    pub author_entry: Option<FeedEntry>,
    pub followers: usize,
    pub job_ids: Vec<String>,
}

/// Splits a post's audience into queue jobs of `batch_size` followers.
#[derive(Clone)]
pub struct FanoutDispatcher {
    newsfeeds: Arc<NewsFeedService>,
    graph: Arc<dyn SocialGraph>,
    jobs: Arc<dyn JobsRepo>,
    batch_size: usize,
    max_attempts: i32,
}

impl FanoutDispatcher {
    pub fn new(
        newsfeeds: Arc<NewsFeedService>,
        graph: Arc<dyn SocialGraph>,
        jobs: Arc<dyn JobsRepo>,
        batch_size: usize,
        max_attempts: i32,
    ) -> Self {
        Self {
            newsfeeds,
            graph,
            jobs,
            batch_size: batch_size.max(1),
            max_attempts,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Make `post` visible to its author right away and schedule delivery to
    /// every follower.
    ///
    /// Errors from the author's own write or from scheduling are returned;
    /// batches already enqueued stay enqueued.
    pub async fn on_post_created(&self, post: PostCreated) -> Result<FanoutReport, FanoutError> {
        let author_entry = self.newsfeeds.create(post.entry_for(post.author_id)).await?;

        let mut followers = self.graph.follower_ids(post.author_id).await?;
        followers.retain(|&id| id != post.author_id);
        followers.sort_unstable();
        followers.dedup();

        let mut job_ids = Vec::with_capacity(followers.len().div_ceil(self.batch_size));
        for chunk in followers.chunks(self.batch_size) {
            let payload = FanoutBatchJobPayload {
                post_id: post.post_id,
                created_at: post.created_at,
                follower_ids: chunk.to_vec(),
            };
            let job_id =
                enqueue_fanout_batch_job(self.jobs.as_ref(), &payload, self.max_attempts).await?;
            counter!(METRIC_FANOUT_BATCHES_ENQUEUED).increment(1);
            job_ids.push(job_id);
        }

        info!(
            target = "feedline::application::fanout::on_post_created",
            post_id = post.post_id,
            author_id = post.author_id,
            followers = followers.len(),
            batches = job_ids.len(),
            "fanout scheduled"
        );

        Ok(FanoutReport {
            post_id: post.post_id,
            author_entry,
            followers: followers.len(),
            job_ids,
        })
    }
}
