//! Batch cache-aside loader for static snapshots.
//!
//! One multi-get covers every requested id. Hits are decoded; absent and
//! malformed entries are misses. All misses are fetched from the datastore in
//! a single batch, assembled from flat rows, written back, and the result is
//! projected through the caller's id order. Ids the datastore does not know
//! are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::application::assembler::{FlatRow, Grouped, assemble};
use crate::application::repos::RepoError;

use super::client::CacheClient;
use super::keys::{Collection, snapshot_key};

/// A viewer-independent projection that may be cached under `{collection}:{id}`.
pub trait Snapshot: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Flat joined row the datastore returns for this snapshot.
    type Row: FlatRow<Key = Uuid> + Send;

    const COLLECTION: Collection;

    fn snapshot_id(&self) -> Uuid;

    fn from_group(
        group: Grouped<<Self::Row as FlatRow>::Parent, <Self::Row as FlatRow>::Child>,
    ) -> Self;
}

#[async_trait]
pub trait SnapshotSource<S: Snapshot>: Send + Sync {
    /// Rows for every known id among `ids`, grouped by parent in a stable order.
    async fn fetch_rows(&self, ids: &[Uuid]) -> Result<Vec<S::Row>, RepoError>;
}

pub struct SnapshotLoader<S: Snapshot> {
    cache: CacheClient,
    source: Arc<dyn SnapshotSource<S>>,
    ttl: Duration,
}

impl<S: Snapshot> Clone for SnapshotLoader<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            source: Arc::clone(&self.source),
            ttl: self.ttl,
        }
    }
}

impl<S: Snapshot> SnapshotLoader<S> {
    pub fn new(cache: CacheClient, source: Arc<dyn SnapshotSource<S>>, ttl: Duration) -> Self {
        Self { cache, source, ttl }
    }

    /// Resolve `ids` to snapshots, preserving their order.
    pub async fn load(&self, ids: &[Uuid]) -> Result<Vec<S>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| snapshot_key(S::COLLECTION, id))
            .collect();
        let lookups = self.cache.mget_json::<S>(S::COLLECTION, &keys).await;

        let mut resolved: HashMap<Uuid, S> = HashMap::with_capacity(ids.len());
        let mut missed: Vec<Uuid> = Vec::new();
        for (id, lookup) in ids.iter().zip(lookups) {
            match lookup.into_hit() {
                // An entry stored under the wrong key is as good as absent.
                Some(snapshot) if snapshot.snapshot_id() == *id => {
                    resolved.insert(*id, snapshot);
                }
                _ => missed.push(*id),
            }
        }

        debug!(
            collection = %S::COLLECTION,
            hits = resolved.len(),
            misses = missed.len(),
            "Snapshot lookup"
        );

        if !missed.is_empty() {
            let rows = self.source.fetch_rows(&missed).await?;
            let fetched: Vec<S> = assemble(rows).into_iter().map(S::from_group).collect();

            let writes = fetched.iter().map(|snapshot| {
                let key = snapshot_key(S::COLLECTION, snapshot.snapshot_id());
                let ttl = self.cache.jittered(self.ttl);
                async move {
                    self.cache
                        .set_json(S::COLLECTION, &key, snapshot, ttl)
                        .await
                }
            });
            join_all(writes).await;

            for snapshot in fetched {
                resolved.insert(snapshot.snapshot_id(), snapshot);
            }
        }

        Ok(ids.iter().filter_map(|id| resolved.remove(id)).collect())
    }
}
