//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{CounterKey, FeedEntry, NewFeedEntry, PostCreated};
use crate::domain::error::DomainError;
use crate::domain::types::{JobType, StorageKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Exclusive time bounds for a feed scan: `after < created_at < before`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedRange {
    pub after: Option<OffsetDateTime>,
    pub before: Option<OffsetDateTime>,
}

impl FeedRange {
    pub fn after(at: OffsetDateTime) -> Self {
        Self {
            after: Some(at),
            before: None,
        }
    }

    pub fn before(at: OffsetDateTime) -> Self {
        Self {
            after: None,
            before: Some(at),
        }
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.after.is_none_or(|after| at > after) && self.before.is_none_or(|before| at < before)
    }
}

/// A durable home for feed entries.
///
/// Writes are insert-if-absent on `(owner_id, post_id)`, so replaying a write
/// is harmless and reports nothing new.
#[async_trait]
pub trait FeedStore: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Returns `None` when the owner already sees the post.
    async fn append(&self, entry: NewFeedEntry) -> Result<Option<FeedEntry>, RepoError>;

    /// One bulk write; returns only the entries that were newly stored.
    async fn append_batch(&self, entries: Vec<NewFeedEntry>) -> Result<Vec<FeedEntry>, RepoError>;

    /// Newest first, at most `limit` rows when a limit is given.
    async fn range_query(
        &self,
        owner_id: i64,
        range: FeedRange,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>, RepoError>;

    async fn count(&self, owner_id: i64) -> Result<u64, RepoError>;
}

/// Follow relationships and user existence.
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn follower_ids(&self, user_id: i64) -> Result<Vec<i64>, RepoError>;

    /// The subset of `user_ids` that still reference an existing user.
    async fn existing_user_ids(&self, user_ids: &[i64]) -> Result<Vec<i64>, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_post(&self, post_id: i64) -> Result<Option<PostCreated>, RepoError>;
}

/// Authoritative storage behind cached counters.
#[async_trait]
pub trait CounterSource: Send + Sync {
    async fn load_counter(&self, key: CounterKey) -> Result<i64, RepoError>;

    /// Atomically applies `delta` and returns the stored value.
    async fn adjust_counter(&self, key: CounterKey, delta: i64) -> Result<i64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn feed_range_bounds_are_exclusive() {
        let at = datetime!(2024-01-01 0:00 UTC);
        let range = FeedRange {
            after: Some(at - time::Duration::seconds(10)),
            before: Some(at),
        };

        assert!(!range.contains(at));
        assert!(!range.contains(at - time::Duration::seconds(10)));
        assert!(range.contains(at - time::Duration::seconds(5)));
        assert!(FeedRange::default().contains(at));
    }
}
