use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::feed::PostMediaRow;
use crate::application::repos::{OverlaySource, RepoError};
use crate::cache::SnapshotSource;
use crate::domain::entities::{AuthorCard, MediaItem, PostOverlay, PostSnapshot};
use crate::domain::types::MediaKind;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct PostMediaDbRow {
    post_id: Uuid,
    title: String,
    description: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    author_id: Uuid,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
    media_id: Option<Uuid>,
    media_kind: Option<MediaKind>,
    media_url: Option<String>,
    media_width: Option<i32>,
    media_height: Option<i32>,
    media_position: Option<i32>,
}

impl From<PostMediaDbRow> for PostMediaRow {
    fn from(row: PostMediaDbRow) -> Self {
        let media = match (row.media_id, row.media_kind, row.media_url) {
            (Some(id), Some(kind), Some(url)) => Some(MediaItem {
                id,
                kind,
                url,
                width: row.media_width,
                height: row.media_height,
                position: row.media_position.unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            post_id: row.post_id,
            title: row.title,
            description: row.description,
            author: AuthorCard {
                id: row.author_id,
                username: row.username,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            media,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OverlayRow {
    id: Uuid,
    view_count: i64,
    like_count: i64,
    save_count: i64,
    comment_count: i64,
    is_liked: bool,
    is_saved: bool,
    is_author_followed: bool,
}

impl From<OverlayRow> for PostOverlay {
    fn from(row: OverlayRow) -> Self {
        Self {
            view_count: row.view_count,
            like_count: row.like_count,
            save_count: row.save_count,
            comment_count: row.comment_count,
            is_liked: row.is_liked,
            is_saved: row.is_saved,
            is_author_followed: row.is_author_followed,
        }
    }
}

#[async_trait]
impl SnapshotSource<PostSnapshot> for PostgresRepositories {
    async fn fetch_rows(&self, ids: &[Uuid]) -> Result<Vec<PostMediaRow>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PostMediaDbRow>(
            r#"
            SELECT
                p.id AS post_id,
                p.title,
                p.description,
                p.created_at,
                p.updated_at,
                u.id AS author_id,
                u.username,
                u.display_name,
                u.avatar_url,
                m.id AS media_id,
                m.kind AS media_kind,
                m.url AS media_url,
                m.width AS media_width,
                m.height AS media_height,
                m.position AS media_position
            FROM posts p
            INNER JOIN users u ON u.id = p.author_id
            LEFT JOIN post_media m ON m.post_id = p.id
            WHERE p.id = ANY($1)
            ORDER BY p.id, m.position, m.id
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostMediaRow::from).collect())
    }
}

#[async_trait]
impl OverlaySource<PostOverlay> for PostgresRepositories {
    async fn fetch_overlays(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> Result<HashMap<Uuid, PostOverlay>, RepoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        // A NULL viewer makes every per-viewer EXISTS false.
        let rows = sqlx::query_as::<_, OverlayRow>(
            r#"
            SELECT
                p.id,
                p.view_count,
                (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count,
                (SELECT COUNT(*) FROM post_saves s WHERE s.post_id = p.id) AS save_count,
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
                EXISTS (
                    SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = $2
                ) AS is_liked,
                EXISTS (
                    SELECT 1 FROM post_saves s WHERE s.post_id = p.id AND s.user_id = $2
                ) AS is_saved,
                EXISTS (
                    SELECT 1 FROM follows f
                    WHERE f.follower_id = $2 AND f.followee_id = p.author_id
                ) AS is_author_followed
            FROM posts p
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(viewer)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id, PostOverlay::from(row)))
            .collect())
    }

    async fn record_views(&self, ids: &[Uuid]) -> Result<(), RepoError> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
