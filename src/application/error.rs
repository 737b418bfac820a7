use thiserror::Error;

use crate::{
    application::{
        counters::CounterError, fanout::FanoutError, newsfeeds::FeedError, toggles::ToggleError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Fanout(#[from] FanoutError),
    #[error(transparent)]
    Counter(#[from] CounterError),
    #[error(transparent)]
    Toggle(#[from] ToggleError),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Infra(InfraError::Database { .. } | InfraError::Cache { .. })
                | AppError::Feed(FeedError::Repo(_) | FeedError::Cache(_) | FeedError::Toggle(_))
                | AppError::Fanout(_)
                | AppError::Counter(_)
                | AppError::Toggle(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pagination::PaginationError;
    use crate::application::repos::RepoError;

    #[test]
    fn backend_failures_are_transient() {
        let err = AppError::from(FeedError::Repo(RepoError::Timeout));
        assert!(err.is_transient());
    }

    #[test]
    fn bad_cursors_are_not_transient() {
        let err = AppError::from(FeedError::InvalidCursor(PaginationError::ConflictingCursors));
        assert!(!err.is_transient());
        assert!(!AppError::validation("nope").is_transient());
    }
}
