use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    application::repos::{JobsRepo, NewJobRecord, RepoError},
    cache::mutex_lock,
};

const TARGET: &str = "infra::memory::jobs";

/// FIFO queue used where no Postgres-backed worker runs; callers drain and
/// execute the records themselves.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    next_id: AtomicU64,
    pending: Mutex<VecDeque<(String, NewJobRecord)>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.pending, TARGET, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain(&self) -> Vec<(String, NewJobRecord)> {
        mutex_lock(&self.pending, TARGET, "drain").drain(..).collect()
    }
}

#[async_trait]
impl JobsRepo for MemoryJobQueue {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        mutex_lock(&self.pending, TARGET, "enqueue_job").push_back((id.clone(), job));
        Ok(id)
    }
}
