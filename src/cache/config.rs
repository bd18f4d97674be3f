//! Cache configuration.
//!
//! Controls the key-value store backend and the TTLs used by the snapshot
//! loader and the comment/reply page buffers.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 3600;
const DEFAULT_PAGE_TTL_SECS: u64 = 86_400;
const DEFAULT_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_SCAN_BATCH_SIZE: usize = 100;
const DEFAULT_TTL_JITTER_PERCENT: u8 = 10;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Cache configuration from `feedline.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis connection URL; the in-memory store is used when absent.
    pub redis_url: Option<String>,
    /// TTL applied to static snapshots.
    pub snapshot_ttl_seconds: u64,
    /// TTL applied to page buckets and page cursors.
    pub page_ttl_seconds: u64,
    /// Upper bound for a single store round-trip before it counts as a miss.
    pub op_timeout_ms: u64,
    /// `COUNT` hint passed to each scan iteration during invalidation.
    pub scan_batch_size: usize,
    /// Random extra TTL, as a percentage, added to snapshot writes.
    pub ttl_jitter_percent: u8,
    /// Entry limit of the in-memory store.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            snapshot_ttl_seconds: DEFAULT_SNAPSHOT_TTL_SECS,
            page_ttl_seconds: DEFAULT_PAGE_TTL_SECS,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            ttl_jitter_percent: DEFAULT_TTL_JITTER_PERCENT,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            redis_url: settings.redis_url.clone(),
            snapshot_ttl_seconds: settings.snapshot_ttl.as_secs(),
            page_ttl_seconds: settings.page_ttl.as_secs(),
            op_timeout_ms: u64::try_from(settings.op_timeout.as_millis()).unwrap_or(u64::MAX),
            scan_batch_size: settings.scan_batch_size.get(),
            ttl_jitter_percent: settings.ttl_jitter_percent,
            memory_capacity: settings.memory_capacity.get(),
        }
    }
}

impl CacheConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_seconds.max(1))
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.page_ttl_seconds.max(1))
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms.max(1))
    }

    /// Returns the scan batch size, clamping to 1 if zero.
    pub fn scan_batch_size(&self) -> usize {
        self.scan_batch_size.max(1)
    }

    /// Returns the in-memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
