//! Repository traits describing persistence adapters.
//!
//! Snapshot, child-listing and overlay reads are expressed through the cache
//! layer's source traits ([`SnapshotSource`](crate::cache::SnapshotSource),
//! [`ChildSource`](crate::cache::ChildSource)) and [`OverlaySource`]; this
//! module holds the candidate queries and the write side.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::PaginationError;
use crate::domain::entities::{CandidateId, CommentRecord, ReplyRecord};
use crate::domain::types::FeedSort;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoError::Timeout | RepoError::Persistence(_))
    }
}

/// Restrictions applied by the general ranked source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    pub author: Option<Uuid>,
    pub tag: Option<String>,
    pub sort: FeedSort,
}

impl CandidateFilter {
    pub fn is_unfiltered(&self) -> bool {
        self.author.is_none() && self.tag.is_none()
    }
}

#[async_trait]
pub trait CandidateRepo: Send + Sync {
    /// Most recent posts by authors the viewer follows.
    async fn boosted_candidates(
        &self,
        viewer: Uuid,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError>;

    async fn ranked_candidates(
        &self,
        filter: &CandidateFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError>;
}

#[async_trait]
pub trait SearchRepo: Send + Sync {
    /// Ids ordered by relevance to `query`.
    async fn search(
        &self,
        query: &str,
        filter: &CandidateFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError>;
}

/// Live per-viewer fields for a batch of ids.
#[async_trait]
pub trait OverlaySource<O>: Send + Sync {
    /// One batched read. Ids without a row are simply absent from the map.
    async fn fetch_overlays(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> Result<HashMap<Uuid, O>, RepoError>;

    async fn record_views(&self, _ids: &[Uuid]) -> Result<(), RepoError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct CreateReplyParams {
    pub comment_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait ContentWriteRepo: Send + Sync {
    /// Fails with [`RepoError::NotFound`] when the post does not exist.
    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;

    /// Fails with [`RepoError::NotFound`] when the comment does not exist.
    async fn create_reply(&self, params: CreateReplyParams) -> Result<ReplyRecord, RepoError>;

    /// Returns whether a row was updated.
    async fn update_post(&self, params: UpdatePostParams) -> Result<bool, RepoError>;

    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Returns the updated comment, or `None` when it does not exist.
    async fn update_comment(
        &self,
        id: Uuid,
        body: String,
    ) -> Result<Option<CommentRecord>, RepoError>;

    /// Returns the owning post id of the deleted comment.
    async fn delete_comment(&self, id: Uuid) -> Result<Option<Uuid>, RepoError>;

    /// Returns the owning comment id of the deleted reply.
    async fn delete_reply(&self, id: Uuid) -> Result<Option<Uuid>, RepoError>;

    /// Returns whether the like state changed.
    async fn set_like(&self, post_id: Uuid, user_id: Uuid, liked: bool)
    -> Result<bool, RepoError>;

    async fn set_save(&self, post_id: Uuid, user_id: Uuid, saved: bool)
    -> Result<bool, RepoError>;

    async fn set_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        following: bool,
    ) -> Result<bool, RepoError>;
}

/// Connectivity probe for the datastore.
#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
