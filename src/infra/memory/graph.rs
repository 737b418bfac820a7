use std::{
    collections::{BTreeSet, HashMap},
    sync::RwLock,
};

use async_trait::async_trait;

use crate::{
    application::repos::{RepoError, SocialGraph},
    cache::{rw_read, rw_write},
};

const TARGET: &str = "infra::memory::graph";

#[derive(Debug, Default)]
struct Graph {
    users: BTreeSet<i64>,
    /// followee -> followers
    followers: HashMap<i64, BTreeSet<i64>>,
}

#[derive(Debug, Default)]
pub struct MemorySocialGraph {
    graph: RwLock<Graph>,
}

impl MemorySocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: i64) {
        rw_write(&self.graph, TARGET, "add_user").users.insert(user_id);
    }

    /// Drops the account but leaves follow edges pointing at it, the way a
    /// deletion racing a fanout would.
    pub fn remove_user(&self, user_id: i64) {
        rw_write(&self.graph, TARGET, "remove_user")
            .users
            .remove(&user_id);
    }

    /// Records that `follower_id` follows `followee_id`.
    pub fn follow(&self, follower_id: i64, followee_id: i64) {
        let mut graph = rw_write(&self.graph, TARGET, "follow");
        graph.users.insert(follower_id);
        graph.users.insert(followee_id);
        graph
            .followers
            .entry(followee_id)
            .or_default()
            .insert(follower_id);
    }
}

#[async_trait]
impl SocialGraph for MemorySocialGraph {
    async fn follower_ids(&self, user_id: i64) -> Result<Vec<i64>, RepoError> {
        let graph = rw_read(&self.graph, TARGET, "follower_ids");
        Ok(graph
            .followers
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn existing_user_ids(&self, user_ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        let graph = rw_read(&self.graph, TARGET, "existing_user_ids");
        Ok(user_ids
            .iter()
            .copied()
            .filter(|id| graph.users.contains(id))
            .collect())
    }
}
