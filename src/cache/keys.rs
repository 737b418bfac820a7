//! Cache key layout.

use crate::domain::entities::CounterKey;

const NEWSFEED_LIST_PREFIX: &str = "user_newsfeeds";

/// Cached feed window of one owner.
pub fn newsfeed_list_key(owner_id: i64) -> String {
    format!("{NEWSFEED_LIST_PREFIX}:{owner_id}")
}

/// Cached counter, e.g. `Post.likes_count:42`.
pub fn counter_key(key: &CounterKey) -> String {
    key.to_string()
}
