//! Application services layer.

pub mod counters;
pub mod error;
pub mod fanout;
pub mod jobs;
pub mod newsfeeds;
pub mod pagination;
pub mod repos;
pub mod toggles;
