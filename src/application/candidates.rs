//! Candidate id resolution.
//!
//! Produces the ordered, duplicate-free id list a feed page is assembled
//! from: boosted ids (recent posts by followed authors) first, then the
//! general ranked or search results in their original order.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::application::pagination::PageRequest;
use crate::application::repos::{CandidateFilter, CandidateRepo, RepoError, SearchRepo};
use crate::domain::entities::CandidateId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostPolicy {
    pub limit: u32,
    /// Only boost the first page of a feed.
    pub first_page_only: bool,
}

impl Default for BoostPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            first_page_only: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub viewer: Option<Uuid>,
    pub filter: CandidateFilter,
    pub search: Option<String>,
    pub request: PageRequest,
}

impl CandidateQuery {
    fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePage {
    pub ids: Vec<CandidateId>,
    /// Whether the general source has results beyond this page.
    pub has_more: bool,
    /// How many leading entries of `ids` came from the boost source.
    pub boosted: usize,
}

#[derive(Clone)]
pub struct CandidateResolver {
    ranked: Arc<dyn CandidateRepo>,
    search: Option<Arc<dyn SearchRepo>>,
    boost: BoostPolicy,
}

impl CandidateResolver {
    pub fn new(
        ranked: Arc<dyn CandidateRepo>,
        search: Option<Arc<dyn SearchRepo>>,
        boost: BoostPolicy,
    ) -> Self {
        Self {
            ranked,
            search,
            boost,
        }
    }

    pub async fn resolve(&self, query: &CandidateQuery) -> Result<CandidatePage, RepoError> {
        let (boosted, (general, has_more)) =
            tokio::try_join!(self.boosted(query), self.general(query))?;

        let mut seen: HashSet<Uuid> = HashSet::with_capacity(boosted.len() + general.len());
        let mut ids = Vec::with_capacity(boosted.len() + general.len());
        for candidate in boosted {
            if seen.insert(candidate.id) {
                ids.push(candidate);
            }
        }
        let boosted = ids.len();
        for candidate in general {
            if seen.insert(candidate.id) {
                ids.push(candidate);
            }
        }

        debug!(
            page = query.request.page(),
            boosted,
            total = ids.len(),
            has_more,
            "Resolved feed candidates"
        );

        Ok(CandidatePage {
            ids,
            has_more,
            boosted,
        })
    }

    async fn boosted(&self, query: &CandidateQuery) -> Result<Vec<CandidateId>, RepoError> {
        let Some(viewer) = query.viewer else {
            return Ok(Vec::new());
        };
        let applies = self.boost.limit > 0
            && query.search_term().is_none()
            && query.filter.is_unfiltered()
            && (!self.boost.first_page_only || query.request.is_first());
        if !applies {
            return Ok(Vec::new());
        }
        self.ranked.boosted_candidates(viewer, self.boost.limit).await
    }

    /// General candidates for the page plus whether more exist beyond it.
    async fn general(&self, query: &CandidateQuery) -> Result<(Vec<CandidateId>, bool), RepoError> {
        let offset = query.request.offset();
        let limit = query.request.page_size();
        // One extra row tells us whether another page exists.
        let probe = limit + 1;

        let mut rows = match (query.search_term(), self.search.as_ref()) {
            (Some(term), Some(search)) => {
                let found = search.search(term, &query.filter, offset, probe).await?;
                if found.is_empty() && query.request.is_first() {
                    info!(term, "Search returned no candidates; falling back to ranked feed");
                    self.ranked
                        .ranked_candidates(&query.filter, offset, probe)
                        .await?
                } else {
                    found
                }
            }
            (Some(term), None) => {
                debug!(term, "No search source configured; using ranked feed");
                self.ranked
                    .ranked_candidates(&query.filter, offset, probe)
                    .await?
            }
            (None, _) => {
                self.ranked
                    .ranked_candidates(&query.filter, offset, probe)
                    .await?
            }
        };

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Ok((rows, has_more))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FixedCandidates {
        boosted: Vec<CandidateId>,
        ranked: Vec<CandidateId>,
        boost_calls: Mutex<u32>,
    }

    #[async_trait]
    impl CandidateRepo for FixedCandidates {
        async fn boosted_candidates(
            &self,
            _viewer: Uuid,
            limit: u32,
        ) -> Result<Vec<CandidateId>, RepoError> {
            *self.boost_calls.lock().expect("lock") += 1;
            Ok(self.boosted.iter().take(limit as usize).copied().collect())
        }

        async fn ranked_candidates(
            &self,
            _filter: &CandidateFilter,
            offset: u64,
            limit: u32,
        ) -> Result<Vec<CandidateId>, RepoError> {
            Ok(self
                .ranked
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .copied()
                .collect())
        }
    }

    struct EmptySearch;

    #[async_trait]
    impl SearchRepo for EmptySearch {
        async fn search(
            &self,
            _query: &str,
            _filter: &CandidateFilter,
            _offset: u64,
            _limit: u32,
        ) -> Result<Vec<CandidateId>, RepoError> {
            Ok(Vec::new())
        }
    }

    fn candidate(n: u128) -> CandidateId {
        CandidateId::new(Uuid::from_u128(n), Uuid::from_u128(1000 + n))
    }

    fn query(viewer: Option<Uuid>, page: u32, size: u32) -> CandidateQuery {
        CandidateQuery {
            viewer,
            filter: CandidateFilter::default(),
            search: None,
            request: PageRequest::new(page, size, 100).expect("page request"),
        }
    }

    fn resolver(boosted: Vec<CandidateId>, ranked: Vec<CandidateId>) -> (CandidateResolver, Arc<FixedCandidates>) {
        let repo = Arc::new(FixedCandidates {
            boosted,
            ranked,
            boost_calls: Mutex::new(0),
        });
        let resolver = CandidateResolver::new(
            repo.clone(),
            Some(Arc::new(EmptySearch)),
            BoostPolicy::default(),
        );
        (resolver, repo)
    }

    #[tokio::test]
    async fn boosted_ids_lead_and_duplicates_are_dropped() {
        let (resolver, _) = resolver(
            vec![candidate(7), candidate(2)],
            (1..=5).map(candidate).collect(),
        );

        let page = resolver
            .resolve(&query(Some(Uuid::from_u128(99)), 1, 3))
            .await
            .expect("resolve");

        let ids: Vec<u128> = page.ids.iter().map(|c| c.id.as_u128()).collect();
        assert_eq!(ids, vec![7, 2, 1, 3]);
        assert_eq!(page.boosted, 2);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn anonymous_viewer_gets_no_boost() {
        let (resolver, repo) = resolver(vec![candidate(7)], (1..=2).map(candidate).collect());
        let page = resolver.resolve(&query(None, 1, 5)).await.expect("resolve");

        assert_eq!(page.boosted, 0);
        assert_eq!(page.ids.len(), 2);
        assert!(!page.has_more);
        assert_eq!(*repo.boost_calls.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn empty_sources_yield_empty_page() {
        let (resolver, _) = resolver(Vec::new(), Vec::new());
        let page = resolver
            .resolve(&query(Some(Uuid::from_u128(1)), 1, 5))
            .await
            .expect("resolve");
        assert_eq!(page, CandidatePage::default());
    }

    #[tokio::test]
    async fn empty_search_falls_back_to_ranked_on_first_page() {
        let (resolver, _) = resolver(Vec::new(), (1..=3).map(candidate).collect());
        let mut search = query(None, 1, 5);
        search.search = Some("nothing matches".into());

        let page = resolver.resolve(&search).await.expect("resolve");
        assert_eq!(page.ids.len(), 3);

        search.request = PageRequest::new(2, 5, 100).expect("page request");
        let page = resolver.resolve(&search).await.expect("resolve");
        assert!(page.ids.is_empty());
    }

    #[tokio::test]
    async fn first_page_only_policy_skips_later_pages() {
        let repo = Arc::new(FixedCandidates {
            boosted: vec![candidate(9)],
            ranked: (1..=10).map(candidate).collect(),
            boost_calls: Mutex::new(0),
        });
        let resolver = CandidateResolver::new(
            repo.clone(),
            None,
            BoostPolicy {
                limit: 5,
                first_page_only: true,
            },
        );

        let page = resolver
            .resolve(&query(Some(Uuid::from_u128(1)), 2, 3))
            .await
            .expect("resolve");
        assert_eq!(page.boosted, 0);
        let ids: Vec<u128> = page.ids.iter().map(|c| c.id.as_u128()).collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }
}
