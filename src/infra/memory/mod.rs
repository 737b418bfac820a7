//! In-process engines for tests, simulations and single-node development.

mod counters;
mod feeds;
mod graph;
mod jobs;
mod wide_column;

pub use counters::MemoryCounterSource;
pub use feeds::MemoryFeedStore;
pub use graph::MemorySocialGraph;
pub use jobs::MemoryJobQueue;
pub use wide_column::MemoryWideColumnTable;
