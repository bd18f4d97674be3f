//! Domain entities mirrored from persistent storage.
//!
//! `PostSnapshot` is the viewer-independent projection that may live in the
//! cache. `PostOverlay` carries the live fields and is never cached.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::MediaKind;

/// A candidate entity produced by a ranking or search source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId {
    pub id: Uuid,
    pub author_id: Uuid,
}

impl CandidateId {
    pub fn new(id: Uuid, author_id: Uuid) -> Self {
        Self { id, author_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCard {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: Uuid,
    pub kind: MediaKind,
    pub url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub author: AuthorCard,
    pub media: Vec<MediaItem>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Live per-request fields for one post.
///
/// `Default` is the value used when the overlay query returns no row for an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PostOverlay {
    pub view_count: i64,
    pub like_count: i64,
    pub save_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    pub is_saved: bool,
    pub is_author_followed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: AuthorCard,
    pub body: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRecord {
    pub id: Uuid,
    pub comment_id: Uuid,
    pub post_id: Uuid,
    pub author: AuthorCard,
    pub body: String,
    pub created_at: OffsetDateTime,
}
