//! Pattern-based invalidation after mutations.

use tracing::info;
use uuid::Uuid;

use super::client::CacheClient;
use super::error::CacheError;
use super::keys::{Collection, page_cursor_key, parent_pattern, snapshot_key};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Keys removed by the pattern sweep.
    pub swept: u64,
    /// Keys removed by direct deletes (cursor and snapshot).
    pub deleted: u64,
}

impl InvalidationReport {
    pub fn total(&self) -> u64 {
        self.swept + self.deleted
    }
}

#[derive(Clone)]
pub struct Invalidator {
    cache: CacheClient,
}

impl Invalidator {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Remove every page bucket and the cursor of `children` under `parent`,
    /// plus the parent's own snapshot when `snapshot` names its collection.
    pub async fn invalidate_parent(
        &self,
        children: Collection,
        parent: Uuid,
        snapshot: Option<Collection>,
    ) -> Result<InvalidationReport, CacheError> {
        let swept = self.cache.sweep(&parent_pattern(children, parent)).await?;

        let mut keys = vec![page_cursor_key(children, parent)];
        if let Some(collection) = snapshot {
            keys.push(snapshot_key(collection, parent));
        }
        let deleted = self.cache.delete(&keys).await?;

        let report = InvalidationReport { swept, deleted };
        info!(
            collection = %children,
            parent_id = %parent,
            deleted = report.total(),
            "Invalidated cached pages"
        );
        Ok(report)
    }

    pub async fn invalidate_snapshot(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<u64, CacheError> {
        self.cache.delete(&[snapshot_key(collection, id)]).await
    }
}
