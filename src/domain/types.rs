//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

/// Background job namespaces on the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FanoutBatch,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::FanoutBatch => "newsfeed_fanout_batch",
        }
    }
}

impl TryFrom<&str> for JobType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "newsfeed_fanout_batch" => Ok(JobType::FanoutBatch),
            _ => Err(()),
        }
    }
}

/// Durable engines a feed can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Relational,
    WideColumn,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Relational => "relational",
            StorageKind::WideColumn => "wide_column",
        }
    }
}

/// Objects that carry cached counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountedKind {
    Post,
    Comment,
}

impl CountedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CountedKind::Post => "Post",
            CountedKind::Comment => "Comment",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            CountedKind::Post => "posts",
            CountedKind::Comment => "comments",
        }
    }

    pub fn supports(self, attribute: CounterAttribute) -> bool {
        match self {
            CountedKind::Post => true,
            CountedKind::Comment => attribute == CounterAttribute::LikesCount,
        }
    }
}

impl TryFrom<&str> for CountedKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Post" => Ok(CountedKind::Post),
            "Comment" => Ok(CountedKind::Comment),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterAttribute {
    LikesCount,
    CommentsCount,
}

impl CounterAttribute {
    /// Also the column name in the owning table.
    pub fn as_str(self) -> &'static str {
        match self {
            CounterAttribute::LikesCount => "likes_count",
            CounterAttribute::CommentsCount => "comments_count",
        }
    }
}

impl TryFrom<&str> for CounterAttribute {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "likes_count" => Ok(CounterAttribute::LikesCount),
            "comments_count" => Ok(CounterAttribute::CommentsCount),
            _ => Err(()),
        }
    }
}
