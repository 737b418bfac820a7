//! Newsfeed fanout, bounded feed caching and cursor pagination over a
//! relational and a wide-column feed store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
