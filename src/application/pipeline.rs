//! Generic feed assembly: candidates, then snapshots and overlays in parallel.

use tracing::debug;
use uuid::Uuid;

use crate::application::candidates::{CandidateQuery, CandidateResolver};
use crate::application::overlay::{AssembledEntity, OverlayMerger};
use crate::application::pagination::FeedPage;
use crate::application::repos::RepoError;
use crate::cache::{Snapshot, SnapshotLoader};

pub struct FeedPipeline<S: Snapshot, O> {
    resolver: CandidateResolver,
    loader: SnapshotLoader<S>,
    overlays: OverlayMerger<O>,
}

impl<S: Snapshot, O> Clone for FeedPipeline<S, O> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            loader: self.loader.clone(),
            overlays: self.overlays.clone(),
        }
    }
}

impl<S, O> FeedPipeline<S, O>
where
    S: Snapshot,
    O: Default + Send + 'static,
{
    pub fn new(
        resolver: CandidateResolver,
        loader: SnapshotLoader<S>,
        overlays: OverlayMerger<O>,
    ) -> Self {
        Self {
            resolver,
            loader,
            overlays,
        }
    }

    pub async fn page(
        &self,
        query: &CandidateQuery,
    ) -> Result<FeedPage<AssembledEntity<S, O>>, RepoError> {
        let candidates = self.resolver.resolve(query).await?;
        if candidates.ids.is_empty() {
            return Ok(FeedPage::empty(query.request));
        }

        let ids: Vec<Uuid> = candidates.ids.iter().map(|candidate| candidate.id).collect();
        let items = self.assemble(&ids, query.viewer).await?;

        debug!(
            page = query.request.page(),
            candidates = ids.len(),
            assembled = items.len(),
            "Assembled feed page"
        );

        Ok(FeedPage {
            items,
            page: query.request.page(),
            page_size: query.request.page_size(),
            has_more: candidates.has_more,
        })
    }

    /// Wait for background writes started by earlier reads.
    pub async fn drain(&self) {
        self.overlays.drain().await;
    }

    /// Assemble entities for an explicit, already ordered id list.
    pub async fn assemble(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> Result<Vec<AssembledEntity<S, O>>, RepoError> {
        let (snapshots, overlays) =
            tokio::try_join!(self.loader.load(ids), self.overlays.fetch(ids, viewer))?;
        Ok(OverlayMerger::merge(snapshots, overlays))
    }
}
