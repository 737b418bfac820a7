//! Feeds on a wide-column table keyed by reversed owner and time.
//!
//! The table contract mirrors what column stores offer: rows addressed by a
//! byte-ordered string key, check-and-put writes, and prefix scans bounded by
//! inclusive start/stop keys in either direction.

mod row_key;
mod store;

pub use row_key::{RowKey, owner_prefix};
pub use store::WideColumnFeedStore;

use async_trait::async_trait;

use crate::application::repos::RepoError;

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub key: String,
    pub columns: serde_json::Value,
}

/// A bounded prefix scan.
///
/// Bounds are inclusive. A forward scan visits `start..=stop` in ascending
/// key order; a reverse scan starts at the upper bound `start` and walks down
/// to `stop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowScan {
    pub prefix: String,
    pub start: Option<String>,
    pub stop: Option<String>,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl RowScan {
    pub fn matches(&self, key: &str) -> bool {
        if !key.starts_with(&self.prefix) {
            return false;
        }
        let (lower, upper) = if self.reverse {
            (self.stop.as_deref(), self.start.as_deref())
        } else {
            (self.start.as_deref(), self.stop.as_deref())
        };
        lower.is_none_or(|lower| key >= lower) && upper.is_none_or(|upper| key <= upper)
    }
}

#[async_trait]
pub trait WideColumnTable: Send + Sync {
    /// Write rows whose keys are not taken yet; returns the keys written.
    async fn put_absent(&self, rows: Vec<WideRow>) -> Result<Vec<String>, RepoError>;

    async fn scan(&self, scan: &RowScan) -> Result<Vec<WideRow>, RepoError>;

    async fn count_prefix(&self, prefix: &str) -> Result<u64, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_scan_bounds_are_inclusive() {
        let scan = RowScan {
            prefix: "1:".into(),
            start: Some("1:5".into()),
            stop: Some("1:2".into()),
            reverse: true,
            limit: None,
        };

        assert!(scan.matches("1:5"));
        assert!(scan.matches("1:2"));
        assert!(scan.matches("1:3"));
        assert!(!scan.matches("1:6"));
        assert!(!scan.matches("1:1"));
        assert!(!scan.matches("2:3"));
    }
}
