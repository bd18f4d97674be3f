//! Merging of live per-viewer fields onto cached snapshots.
//!
//! Overlays are read with one batched query per call and are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{OverlaySource, RepoError};
use crate::cache::Snapshot;

/// A snapshot with its overlay merged; the unit returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledEntity<S, O> {
    #[serde(flatten)]
    pub snapshot: S,
    #[serde(flatten)]
    pub overlay: O,
}

pub struct OverlayMerger<O> {
    source: Arc<dyn OverlaySource<O>>,
    record_views: bool,
    /// View increments still in flight; shared between clones.
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl<O> Clone for OverlayMerger<O> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            record_views: self.record_views,
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<O> OverlayMerger<O>
where
    O: Default + Send + 'static,
{
    pub fn new(source: Arc<dyn OverlaySource<O>>, record_views: bool) -> Self {
        Self {
            source,
            record_views,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Read overlays for `ids`. When view recording is on, the increment is
    /// spawned after the read, so the returned counts are pre-increment.
    pub async fn fetch(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> Result<HashMap<Uuid, O>, RepoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let overlays = self.source.fetch_overlays(ids, viewer).await?;

        if self.record_views {
            let source = Arc::clone(&self.source);
            let ids = ids.to_vec();
            let mut pending = self.pending.lock().await;
            while pending.try_join_next().is_some() {}
            pending.spawn(async move {
                if let Err(err) = source.record_views(&ids).await {
                    warn!(count = ids.len(), error = %err, "Failed to record views");
                }
            });
        }

        Ok(overlays)
    }

    /// Wait for every view increment spawned so far.
    pub async fn drain(&self) {
        let mut pending = self.pending.lock().await;
        while let Some(joined) = pending.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "View recording task did not complete");
            }
        }
    }

    /// Pair each snapshot with its overlay, keeping snapshot order.
    /// Ids without an overlay row get `O::default()`.
    pub fn merge<S: Snapshot>(
        snapshots: Vec<S>,
        mut overlays: HashMap<Uuid, O>,
    ) -> Vec<AssembledEntity<S, O>> {
        snapshots
            .into_iter()
            .map(|snapshot| {
                let overlay = overlays.remove(&snapshot.snapshot_id()).unwrap_or_default();
                AssembledEntity { snapshot, overlay }
            })
            .collect()
    }
}
