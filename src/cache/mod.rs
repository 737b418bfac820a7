//! Feedline cache layer
//!
//! Two structures live in the key-value cache:
//!
//! - **Bounded lists**: one most-recent-first window per feed owner, capped at
//!   `list_length_limit` entries, populated lazily and maintained by
//!   left-push plus right-trim.
//! - **Counters**: one integer per counted attribute, backfilled from the
//!   durable source on a miss.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! list_length_limit = 1000
//! key_ttl_seconds = 604800
//! ```

mod backend;
mod config;
mod counters;
pub mod keys;
mod lock;
mod memory;
mod store;

pub use backend::{CacheBackend, CacheError};
pub use config::CacheConfig;
pub use counters::CounterCache;
pub use memory::MemoryCacheBackend;
pub use store::BoundedListStore;

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
