//! Runtime switches and backend selection.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::application::repos::FeedStore;
use crate::domain::types::StorageKind;

/// Routes newsfeed reads and writes to the wide-column store when on.
pub const NEWSFEED_WIDE_COLUMN_SWITCH: &str = "switch_newsfeed_to_wide_column";

#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("toggle store error: {0}")]
    Store(String),
}

impl ToggleError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

/// Named boolean switches that can be flipped while the system runs.
/// Unknown switches read as off.
#[async_trait]
pub trait ToggleProvider: Send + Sync {
    async fn is_on(&self, name: &str) -> Result<bool, ToggleError>;

    async fn set(&self, name: &str, on: bool) -> Result<(), ToggleError>;
}

/// Process-local switches.
#[derive(Debug, Default)]
pub struct StaticToggles {
    switches: DashMap<String, bool>,
}

impl StaticToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: &str, on: bool) -> Self {
        self.switches.insert(name.to_string(), on);
        self
    }
}

#[async_trait]
impl ToggleProvider for StaticToggles {
    async fn is_on(&self, name: &str) -> Result<bool, ToggleError> {
        Ok(self.switches.get(name).is_some_and(|entry| *entry))
    }

    async fn set(&self, name: &str, on: bool) -> Result<(), ToggleError> {
        self.switches.insert(name.to_string(), on);
        Ok(())
    }
}

/// Both durable feed stores plus the switch choosing between them.
#[derive(Clone)]
pub struct FeedBackends {
    toggles: Arc<dyn ToggleProvider>,
    relational: Arc<dyn FeedStore>,
    wide_column: Arc<dyn FeedStore>,
}

impl FeedBackends {
    pub fn new(
        toggles: Arc<dyn ToggleProvider>,
        relational: Arc<dyn FeedStore>,
        wide_column: Arc<dyn FeedStore>,
    ) -> Self {
        Self {
            toggles,
            relational,
            wide_column,
        }
    }

    pub fn toggles(&self) -> &Arc<dyn ToggleProvider> {
        &self.toggles
    }

    pub fn store(&self, kind: StorageKind) -> Arc<dyn FeedStore> {
        match kind {
            StorageKind::Relational => Arc::clone(&self.relational),
            StorageKind::WideColumn => Arc::clone(&self.wide_column),
        }
    }

    /// Read the switch once and return the store the current operation uses.
    pub async fn select(&self) -> Result<Arc<dyn FeedStore>, ToggleError> {
        let kind = if self.toggles.is_on(NEWSFEED_WIDE_COLUMN_SWITCH).await? {
            StorageKind::WideColumn
        } else {
            StorageKind::Relational
        };
        debug!(
            target = "feedline::application::toggles",
            backend = kind.as_str(),
            "feed backend selected"
        );
        Ok(self.store(kind))
    }
}
