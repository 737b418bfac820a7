use std::{sync::Arc, time::Duration};

use apalis::prelude::Error as ApalisError;

use crate::application::{newsfeeds::NewsFeedService, repos::SocialGraph};

/// Shared context passed to job workers.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub newsfeeds: Arc<NewsFeedService>,
    pub graph: Arc<dyn SocialGraph>,
    /// Hard limit on one fanout batch attempt.
    pub fanout_time_limit: Duration,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
