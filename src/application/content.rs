//! Write-side service: every mutation goes to the datastore first, then the
//! cache is brought in line by appending to a page buffer or invalidating.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::{
    ContentWriteRepo, CreateCommentParams, CreateReplyParams, RepoError, UpdatePostParams,
};
use crate::cache::{AppendResult, CacheError, Collection, InvalidationReport, Invalidator, PageBuffer};
use crate::domain::entities::{CommentRecord, ReplyRecord};
use crate::domain::error::{DomainError, validate_comment_body};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ContentError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ContentError::NotFound { entity: "record" },
            other => ContentError::Repo(other),
        }
    }
}

#[derive(Clone)]
pub struct ContentService {
    writes: Arc<dyn ContentWriteRepo>,
    comments: Arc<PageBuffer<CommentRecord>>,
    replies: Arc<PageBuffer<ReplyRecord>>,
    invalidator: Invalidator,
}

impl ContentService {
    pub fn new(
        writes: Arc<dyn ContentWriteRepo>,
        comments: Arc<PageBuffer<CommentRecord>>,
        replies: Arc<PageBuffer<ReplyRecord>>,
        invalidator: Invalidator,
    ) -> Self {
        Self {
            writes,
            comments,
            replies,
            invalidator,
        }
    }

    pub async fn create_comment(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> Result<CommentRecord, ContentError> {
        let body = validate_comment_body(body)?.to_string();
        let comment = self
            .writes
            .create_comment(CreateCommentParams {
                post_id,
                author_id,
                body,
            })
            .await
            .map_err(|err| not_found_as(err, "post"))?;

        let outcome = self.comments.append(post_id, &comment).await;
        log_append(Collection::COMMENTS, post_id, outcome);
        Ok(comment)
    }

    pub async fn create_reply(
        &self,
        comment_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> Result<ReplyRecord, ContentError> {
        let body = validate_comment_body(body)?.to_string();
        let reply = self
            .writes
            .create_reply(CreateReplyParams {
                comment_id,
                author_id,
                body,
            })
            .await
            .map_err(|err| not_found_as(err, "comment"))?;

        let outcome = self.replies.append(comment_id, &reply).await;
        log_append(Collection::REPLIES, comment_id, outcome);
        Ok(reply)
    }

    pub async fn update_post(&self, params: UpdatePostParams) -> Result<(), ContentError> {
        let id = params.id;
        if !self.writes.update_post(params).await? {
            return Err(ContentError::NotFound { entity: "post" });
        }
        report_invalidation(
            Collection::POSTS,
            id,
            self.invalidator
                .invalidate_snapshot(Collection::POSTS, id)
                .await
                .map(|deleted| InvalidationReport { swept: 0, deleted }),
        );
        Ok(())
    }

    pub async fn delete_post(&self, id: Uuid) -> Result<(), ContentError> {
        if !self.writes.delete_post(id).await? {
            return Err(ContentError::NotFound { entity: "post" });
        }
        report_invalidation(
            Collection::COMMENTS,
            id,
            self.invalidator
                .invalidate_parent(Collection::COMMENTS, id, Some(Collection::POSTS))
                .await,
        );
        Ok(())
    }

    pub async fn update_comment(&self, id: Uuid, body: &str) -> Result<CommentRecord, ContentError> {
        let body = validate_comment_body(body)?.to_string();
        let comment = self
            .writes
            .update_comment(id, body)
            .await?
            .ok_or(ContentError::NotFound { entity: "comment" })?;

        report_invalidation(
            Collection::COMMENTS,
            comment.post_id,
            self.invalidator
                .invalidate_parent(Collection::COMMENTS, comment.post_id, None)
                .await,
        );
        Ok(comment)
    }

    pub async fn delete_comment(&self, id: Uuid) -> Result<(), ContentError> {
        let post_id = self
            .writes
            .delete_comment(id)
            .await?
            .ok_or(ContentError::NotFound { entity: "comment" })?;

        report_invalidation(
            Collection::COMMENTS,
            post_id,
            self.invalidator
                .invalidate_parent(Collection::COMMENTS, post_id, None)
                .await,
        );
        report_invalidation(
            Collection::REPLIES,
            id,
            self.invalidator
                .invalidate_parent(Collection::REPLIES, id, None)
                .await,
        );
        Ok(())
    }

    pub async fn delete_reply(&self, id: Uuid) -> Result<(), ContentError> {
        let comment_id = self
            .writes
            .delete_reply(id)
            .await?
            .ok_or(ContentError::NotFound { entity: "reply" })?;

        report_invalidation(
            Collection::REPLIES,
            comment_id,
            self.invalidator
                .invalidate_parent(Collection::REPLIES, comment_id, None)
                .await,
        );
        Ok(())
    }

    // Counters and viewer flags live in the overlay, so these never touch the cache.

    pub async fn like(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, ContentError> {
        Ok(self.writes.set_like(post_id, user_id, true).await?)
    }

    pub async fn unlike(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, ContentError> {
        Ok(self.writes.set_like(post_id, user_id, false).await?)
    }

    pub async fn save(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, ContentError> {
        Ok(self.writes.set_save(post_id, user_id, true).await?)
    }

    pub async fn unsave(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, ContentError> {
        Ok(self.writes.set_save(post_id, user_id, false).await?)
    }

    pub async fn follow(&self, follower: Uuid, followee: Uuid) -> Result<bool, ContentError> {
        Ok(self.writes.set_follow(follower, followee, true).await?)
    }

    pub async fn unfollow(&self, follower: Uuid, followee: Uuid) -> Result<bool, ContentError> {
        Ok(self.writes.set_follow(follower, followee, false).await?)
    }
}

fn not_found_as(err: RepoError, entity: &'static str) -> ContentError {
    match err {
        RepoError::NotFound => ContentError::NotFound { entity },
        other => ContentError::Repo(other),
    }
}

fn log_append(collection: Collection, parent: Uuid, outcome: AppendResult) {
    match outcome {
        AppendResult::Appended(_) | AppendResult::Seeded(_) | AppendResult::Present(_) => {}
        AppendResult::Skipped => {
            info!(collection = %collection, parent_id = %parent, "Page append skipped; pages will rebuild on read");
        }
    }
}

/// Invalidation failures after a committed write are logged, not returned.
fn report_invalidation(
    collection: Collection,
    parent: Uuid,
    result: Result<InvalidationReport, CacheError>,
) {
    if let Err(err) = result {
        warn!(
            collection = %collection,
            parent_id = %parent,
            error = %err,
            "Cache invalidation failed; entries will expire at TTL"
        );
    }
}
