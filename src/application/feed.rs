//! Read-side services: the post feed and the comment/reply pages.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::assembler::{FlatRow, Grouped};
use crate::application::candidates::CandidateQuery;
use crate::application::overlay::AssembledEntity;
use crate::application::pagination::{FeedPage, PageRequest, PaginationError};
use crate::application::pipeline::FeedPipeline;
use crate::application::repos::{CandidateFilter, RepoError};
use crate::cache::{ChildPage, Collection, PageBuffer, PageError, PageItem, Snapshot};
use crate::domain::entities::{
    AuthorCard, CommentRecord, MediaItem, PostOverlay, PostSnapshot, ReplyRecord,
};
use crate::domain::types::FeedSort;

/// A post as returned to readers.
pub type FeedEntry = AssembledEntity<PostSnapshot, PostOverlay>;

/// One row of `posts ⋈ users ⟕ post_media`.
#[derive(Debug, Clone)]
pub struct PostMediaRow {
    pub post_id: Uuid,
    pub title: String,
    pub description: String,
    pub author: AuthorCard,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub media: Option<MediaItem>,
}

/// Post columns of a [`PostMediaRow`], before media are attached.
#[derive(Debug, Clone)]
pub struct PostHead {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub author: AuthorCard,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FlatRow for PostMediaRow {
    type Key = Uuid;
    type Parent = PostHead;
    type Child = MediaItem;

    fn parent_key(&self) -> Uuid {
        self.post_id
    }

    fn split(self) -> (PostHead, Option<MediaItem>) {
        let head = PostHead {
            id: self.post_id,
            title: self.title,
            description: self.description,
            author: self.author,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        (head, self.media)
    }
}

impl Snapshot for PostSnapshot {
    type Row = PostMediaRow;

    const COLLECTION: Collection = Collection::POSTS;

    fn snapshot_id(&self) -> Uuid {
        self.id
    }

    fn from_group(group: Grouped<PostHead, MediaItem>) -> Self {
        let Grouped { parent, children } = group;
        PostSnapshot {
            id: parent.id,
            title: parent.title,
            description: parent.description,
            author: parent.author,
            media: children,
            created_at: parent.created_at,
            updated_at: parent.updated_at,
        }
    }
}

impl PageItem for CommentRecord {
    fn page_item_id(&self) -> Uuid {
        self.id
    }
}

impl PageItem for ReplyRecord {
    fn page_item_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FeedFilter {
    #[default]
    All,
    Author(Uuid),
    Tag(String),
}

impl FeedFilter {
    fn to_candidate_filter(&self, sort: FeedSort) -> CandidateFilter {
        let mut filter = CandidateFilter {
            sort,
            ..Default::default()
        };
        match self {
            FeedFilter::All => {}
            FeedFilter::Author(author) => filter.author = Some(*author),
            FeedFilter::Tag(tag) => filter.tag = Some(tag.clone()),
        }
        filter
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    pub viewer: Option<Uuid>,
    pub filter: FeedFilter,
    pub sort: FeedSort,
    pub search: Option<String>,
    pub page: u32,
    /// Falls back to the configured default when absent.
    pub page_size: Option<u32>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    InvalidPage(#[from] PaginationError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<PageError> for FeedError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::InvalidPage => FeedError::InvalidPage(PaginationError::InvalidPage),
            PageError::Repo(err) => FeedError::Repo(err),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Clone)]
pub struct FeedService {
    pipeline: FeedPipeline<PostSnapshot, PostOverlay>,
    comments: Arc<PageBuffer<CommentRecord>>,
    replies: Arc<PageBuffer<ReplyRecord>>,
    limits: FeedLimits,
}

impl FeedService {
    pub fn new(
        pipeline: FeedPipeline<PostSnapshot, PostOverlay>,
        comments: Arc<PageBuffer<CommentRecord>>,
        replies: Arc<PageBuffer<ReplyRecord>>,
        limits: FeedLimits,
    ) -> Self {
        Self {
            pipeline,
            comments,
            replies,
            limits,
        }
    }

    pub async fn feed(&self, request: FeedRequest) -> Result<FeedPage<FeedEntry>, FeedError> {
        let page_size = request.page_size.unwrap_or(self.limits.default_page_size);
        let page = PageRequest::new(request.page, page_size, self.limits.max_page_size)?;
        let query = CandidateQuery {
            viewer: request.viewer,
            filter: request.filter.to_candidate_filter(request.sort),
            search: request.search,
            request: page,
        };
        Ok(self.pipeline.page(&query).await?)
    }

    /// A single post with live fields, or `None` when it does not exist.
    pub async fn post(&self, id: Uuid, viewer: Option<Uuid>) -> Result<Option<FeedEntry>, FeedError> {
        let mut entries = self.pipeline.assemble(&[id], viewer).await?;
        Ok(entries.pop())
    }

    /// Wait for view increments from earlier reads; call before shutdown.
    pub async fn drain(&self) {
        self.pipeline.drain().await;
    }

    pub async fn comments(
        &self,
        post_id: Uuid,
        page: u32,
    ) -> Result<ChildPage<CommentRecord>, FeedError> {
        Ok(self.comments.read_page(post_id, page).await?)
    }

    pub async fn replies(
        &self,
        comment_id: Uuid,
        page: u32,
    ) -> Result<ChildPage<ReplyRecord>, FeedError> {
        Ok(self.replies.read_page(comment_id, page).await?)
    }
}
