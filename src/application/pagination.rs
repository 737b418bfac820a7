//! Cursor pagination over cached windows and durable feed stores.
//!
//! Two mutually exclusive cursor modes exist. `After(t)` returns everything
//! newer than `t` in one page and never reports a next page. `Before(t)` and
//! the absent cursor return at most `page_size` entries, over-fetching by one
//! row to learn whether more remain.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::application::repos::{FeedRange, FeedStore, RepoError};
use crate::domain::entities::{FeedEntry, from_unix_micros, truncate_to_micros, unix_micros};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CursorDirection {
    After,
    Before,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct FeedCursorPayload {
    direction: CursorDirection,
    at: OffsetDateTime,
}

/// Position in a reverse-chronological feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCursor {
    /// Entries strictly newer than the timestamp.
    After(OffsetDateTime),
    /// Entries strictly older than the timestamp.
    Before(OffsetDateTime),
}

impl FeedCursor {
    pub fn after(at: OffsetDateTime) -> Self {
        Self::After(truncate_to_micros(at))
    }

    pub fn before(at: OffsetDateTime) -> Self {
        Self::Before(truncate_to_micros(at))
    }

    pub fn at(&self) -> OffsetDateTime {
        match self {
            Self::After(at) | Self::Before(at) => *at,
        }
    }

    pub fn range(&self) -> FeedRange {
        match self {
            Self::After(at) => FeedRange::after(*at),
            Self::Before(at) => FeedRange::before(*at),
        }
    }

    pub fn encode(&self) -> String {
        let payload = match *self {
            Self::After(at) => FeedCursorPayload {
                direction: CursorDirection::After,
                at,
            },
            Self::Before(at) => FeedCursorPayload {
                direction: CursorDirection::Before,
                at,
            },
        };
        let serialized =
            serde_json::to_vec(&payload).expect("serializing feed cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: FeedCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(match payload.direction {
            CursorDirection::After => Self::after(payload.at),
            CursorDirection::Before => Self::before(payload.at),
        })
    }

    /// Build a cursor from `created_at__gt` / `created_at__lt` query values.
    ///
    /// Values are RFC 3339 timestamps or integer microseconds since the epoch.
    pub fn from_query(
        created_at_gt: Option<&str>,
        created_at_lt: Option<&str>,
    ) -> Result<Option<Self>, PaginationError> {
        match (created_at_gt, created_at_lt) {
            (Some(_), Some(_)) => Err(PaginationError::ConflictingCursors),
            (Some(value), None) => parse_timestamp(value).map(|at| Some(Self::after(at))),
            (None, Some(value)) => parse_timestamp(value).map(|at| Some(Self::before(at))),
            (None, None) => Ok(None),
        }
    }
}

fn parse_timestamp(value: &str) -> Result<OffsetDateTime, PaginationError> {
    let trimmed = value.trim();
    if let Ok(micros) = trimmed.parse::<i64>() {
        return from_unix_micros(micros)
            .map_err(|err| PaginationError::InvalidTimestamp(err.to_string()));
    }
    OffsetDateTime::parse(trimmed, &Rfc3339)
        .map_err(|err| PaginationError::InvalidTimestamp(format!("`{trimmed}`: {err}")))
}

/// Anything ordered by a creation timestamp.
pub trait Chronological {
    fn created_at(&self) -> OffsetDateTime;
}

impl Chronological for FeedEntry {
    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// One page of a feed, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedPage<T> {
    pub entries: Vec<T>,
    pub has_next_page: bool,
}

impl<T> FeedPage<T> {
    pub fn new(entries: Vec<T>, has_next_page: bool) -> Self {
        Self {
            entries,
            has_next_page,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), false)
    }
}

impl<T: Chronological> FeedPage<T> {
    /// Token for the page after this one, if there is one.
    pub fn next_cursor(&self) -> Option<FeedCursor> {
        if !self.has_next_page {
            return None;
        }
        self.entries
            .last()
            .map(|entry| FeedCursor::Before(entry.created_at()))
    }
}

/// Paginate an already sorted, newest-first sequence.
pub fn paginate_window<T>(window: &[T], cursor: Option<FeedCursor>, page_size: usize) -> FeedPage<T>
where
    T: Chronological + Clone,
{
    match cursor {
        Some(FeedCursor::After(at)) => {
            let entries = window
                .iter()
                .take_while(|entry| entry.created_at() > at)
                .cloned()
                .collect();
            FeedPage::new(entries, false)
        }
        Some(FeedCursor::Before(at)) => {
            let Some(start) = window.iter().position(|entry| entry.created_at() < at) else {
                return FeedPage::empty();
            };
            take_page(&window[start..], page_size)
        }
        None => take_page(window, page_size),
    }
}

fn take_page<T: Clone>(rest: &[T], page_size: usize) -> FeedPage<T> {
    let entries = rest.iter().take(page_size).cloned().collect();
    FeedPage::new(entries, rest.len() > page_size)
}

/// Answer a page from a cached window when the window is trustworthy.
///
/// The window is a most-recent-first prefix of the feed capped at `capacity`.
/// An `After` answer is always complete because eviction only drops the
/// oldest entries. Otherwise the cache answers when the page filled up
/// (`has_next_page`), or when the window is shorter than the cap and therefore
/// holds the whole feed. `None` means the page must come from the durable
/// store.
pub fn paginate_cached<T>(
    window: &[T],
    cursor: Option<FeedCursor>,
    page_size: usize,
    capacity: usize,
) -> Option<FeedPage<T>>
where
    T: Chronological + Clone,
{
    let page = paginate_window(window, cursor, page_size);

    if matches!(cursor, Some(FeedCursor::After(_))) {
        return Some(page);
    }
    if page.has_next_page || window.len() < capacity {
        return Some(page);
    }
    None
}

/// Translate a cursor into a `range_query` against a durable store.
pub async fn paginate_store(
    store: &dyn FeedStore,
    owner_id: i64,
    cursor: Option<FeedCursor>,
    page_size: usize,
) -> Result<FeedPage<FeedEntry>, RepoError> {
    match cursor {
        Some(FeedCursor::After(at)) => {
            let entries = store
                .range_query(owner_id, FeedRange::after(at), None)
                .await?;
            Ok(FeedPage::new(entries, false))
        }
        Some(cursor @ FeedCursor::Before(_)) => {
            let rows = store
                .range_query(owner_id, cursor.range(), Some(page_size + 1))
                .await?;
            Ok(truncate_page(rows, page_size))
        }
        None => {
            let rows = store
                .range_query(owner_id, FeedRange::default(), Some(page_size + 1))
                .await?;
            Ok(truncate_page(rows, page_size))
        }
    }
}

fn truncate_page<T>(mut rows: Vec<T>, page_size: usize) -> FeedPage<T> {
    let has_next_page = rows.len() > page_size;
    rows.truncate(page_size);
    FeedPage::new(rows, has_next_page)
}

/// Microsecond timestamp rendering used by the plain query form.
pub fn cursor_query_value(at: OffsetDateTime) -> String {
    unix_micros(at).to_string()
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("invalid cursor timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("`created_at__gt` and `created_at__lt` cannot be combined")]
    ConflictingCursors,
}
