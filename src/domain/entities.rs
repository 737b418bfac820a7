//! Feed entities shared by every storage engine.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::domain::{
    error::DomainError,
    types::{CounterAttribute, CountedKind},
};

/// "Post `post_id` is visible in the feed of `owner_id`."
///
/// `id` is only assigned by the relational engine; wide-column rows carry no
/// surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: Option<i64>,
    pub owner_id: i64,
    pub post_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A feed entry that has not been written yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewFeedEntry {
    pub owner_id: i64,
    pub post_id: i64,
    pub created_at: OffsetDateTime,
}

impl NewFeedEntry {
    pub fn new(owner_id: i64, post_id: i64, created_at: OffsetDateTime) -> Self {
        Self {
            owner_id,
            post_id,
            created_at: truncate_to_micros(created_at),
        }
    }

    pub fn into_entry(self, id: Option<i64>) -> FeedEntry {
        FeedEntry {
            id,
            owner_id: self.owner_id,
            post_id: self.post_id,
            created_at: self.created_at,
        }
    }
}

/// Event emitted once a post has been durably stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreated {
    pub post_id: i64,
    pub author_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PostCreated {
    pub fn new(post_id: i64, author_id: i64, created_at: OffsetDateTime) -> Self {
        Self {
            post_id,
            author_id,
            created_at: truncate_to_micros(created_at),
        }
    }

    pub fn entry_for(&self, owner_id: i64) -> NewFeedEntry {
        NewFeedEntry::new(owner_id, self.post_id, self.created_at)
    }
}

/// Normalise a timestamp to UTC with microsecond precision, the finest
/// resolution every storage engine keeps losslessly.
pub fn truncate_to_micros(at: OffsetDateTime) -> OffsetDateTime {
    let utc = at.to_offset(UtcOffset::UTC);
    utc - Duration::nanoseconds(i64::from(utc.nanosecond() % 1_000))
}

/// Microseconds since the Unix epoch.
pub fn unix_micros(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000) as i64
}

pub fn from_unix_micros(micros: i64) -> Result<OffsetDateTime, DomainError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|err| DomainError::validation(format!("timestamp out of range: {err}")))
}

/// Identifies one cached integer counter, rendered as `Post.likes_count:42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterKey {
    kind: CountedKind,
    attribute: CounterAttribute,
    object_id: i64,
}

impl CounterKey {
    pub fn new(
        kind: CountedKind,
        attribute: CounterAttribute,
        object_id: i64,
    ) -> Result<Self, DomainError> {
        if !kind.supports(attribute) {
            return Err(DomainError::validation(format!(
                "{} has no counter `{}`",
                kind.as_str(),
                attribute.as_str()
            )));
        }
        Ok(Self {
            kind,
            attribute,
            object_id,
        })
    }

    pub fn post_likes(post_id: i64) -> Self {
        Self {
            kind: CountedKind::Post,
            attribute: CounterAttribute::LikesCount,
            object_id: post_id,
        }
    }

    pub fn post_comments(post_id: i64) -> Self {
        Self {
            kind: CountedKind::Post,
            attribute: CounterAttribute::CommentsCount,
            object_id: post_id,
        }
    }

    pub fn comment_likes(comment_id: i64) -> Self {
        Self {
            kind: CountedKind::Comment,
            attribute: CounterAttribute::LikesCount,
            object_id: comment_id,
        }
    }

    pub fn kind(&self) -> CountedKind {
        self.kind
    }

    pub fn attribute(&self) -> CounterAttribute {
        self.attribute
    }

    pub fn object_id(&self) -> i64 {
        self.object_id
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}:{}",
            self.kind.as_str(),
            self.attribute.as_str(),
            self.object_id
        )
    }
}

impl FromStr for CounterKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("malformed counter key `{value}`"));

        let (qualified, id) = value.rsplit_once(':').ok_or_else(invalid)?;
        let (kind, attribute) = qualified.split_once('.').ok_or_else(invalid)?;
        let kind = CountedKind::try_from(kind).map_err(|_| invalid())?;
        let attribute = CounterAttribute::try_from(attribute).map_err(|_| invalid())?;
        let object_id = id.parse::<i64>().map_err(|_| invalid())?;

        Self::new(kind, attribute, object_id)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn new_entries_drop_sub_microsecond_precision() {
        let at = datetime!(2024-05-01 12:00:00.123456789 +02:00);
        let entry = NewFeedEntry::new(1, 2, at);

        assert_eq!(entry.created_at, datetime!(2024-05-01 10:00:00.123456 UTC));
        assert_eq!(entry.created_at.offset(), UtcOffset::UTC);
    }

    #[test]
    fn micros_round_trip() {
        let at = datetime!(2024-05-01 10:00:00.654321 UTC);
        let micros = unix_micros(at);

        assert_eq!(from_unix_micros(micros).expect("in range"), at);
    }

    #[test]
    fn counter_key_renders_class_attribute_and_id() {
        assert_eq!(CounterKey::post_likes(42).to_string(), "Post.likes_count:42");
        assert_eq!(
            CounterKey::post_comments(7).to_string(),
            "Post.comments_count:7"
        );
        assert_eq!(
            CounterKey::comment_likes(3).to_string(),
            "Comment.likes_count:3"
        );
    }

    #[test]
    fn counter_key_parses_its_display_form() {
        let key: CounterKey = "Comment.likes_count:9".parse().expect("valid key");
        assert_eq!(key, CounterKey::comment_likes(9));
    }

    #[test]
    fn comments_have_no_comment_counter() {
        let err = CounterKey::new(CountedKind::Comment, CounterAttribute::CommentsCount, 1)
            .expect_err("unsupported attribute");
        assert!(matches!(err, DomainError::Validation { .. }));

        assert!("Comment.comments_count:1".parse::<CounterKey>().is_err());
        assert!("Post.likes_count".parse::<CounterKey>().is_err());
    }
}
