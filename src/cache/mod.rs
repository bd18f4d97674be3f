//! Feedline cache layer
//!
//! Two-tier reads for feed assembly: a key-value store (Redis or in-process)
//! in front of the relational datastore.
//!
//! - **Snapshots**: viewer-independent entity projections under `{collection}:{id}`,
//!   loaded with one multi-get and one batched fill for misses.
//! - **Page buffers**: append-only, fixed-capacity pages of child items under
//!   `{collection}:{parent}:page:{n}` with a `{collection}:{parent}:lastPage` cursor.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! redis_url = "redis://127.0.0.1:6379"
//! snapshot_ttl_seconds = 3600
//! page_ttl_seconds = 86400
//! # ... see config.rs for all options
//! ```
//!
//! Every read path is fail-open: a store error, timeout or undecodable entry
//! is a miss.

mod client;
mod config;
mod error;
mod invalidation;
pub mod keys;
mod loader;
mod lock;
mod pages;
mod redis_store;
mod store;

pub use client::{CacheClient, Lookup};
pub use config::CacheConfig;
pub use error::CacheError;
pub use invalidation::{InvalidationReport, Invalidator};
pub use keys::Collection;
pub use loader::{Snapshot, SnapshotLoader, SnapshotSource};
pub use pages::{
    AppendResult, ChildPage, ChildSource, PageBuffer, PageCursor, PageError, PageItem,
};
pub use redis_store::RedisStore;
pub use store::{AppendOutcome, KvStore, MemoryStore, PageAppend, PageSeed};

pub(crate) use client::{
    METRIC_CACHE_DECODE_ERROR, METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED,
    METRIC_CACHE_MISS, METRIC_CACHE_WRITE,
};
pub(crate) use pages::{METRIC_PAGE_APPEND, METRIC_PAGE_ROLLOVER};
