use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::cache::ChildSource;
use crate::domain::entities::{AuthorCard, CommentRecord, ReplyRecord};

use super::PostgresRepositories;
use super::util::{map_sqlx_error, to_count, to_sql_offset};

#[derive(sqlx::FromRow)]
pub(super) struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    body: String,
    created_at: OffsetDateTime,
    author_id: Uuid,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author: AuthorCard {
                id: row.author_id,
                username: row.username,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
            },
            body: row.body,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ReplyRow {
    id: Uuid,
    comment_id: Uuid,
    post_id: Uuid,
    body: String,
    created_at: OffsetDateTime,
    author_id: Uuid,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
}

impl From<ReplyRow> for ReplyRecord {
    fn from(row: ReplyRow) -> Self {
        Self {
            id: row.id,
            comment_id: row.comment_id,
            post_id: row.post_id,
            author: AuthorCard {
                id: row.author_id,
                username: row.username,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
            },
            body: row.body,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ChildSource<CommentRecord> for PostgresRepositories {
    async fn list_children(
        &self,
        parent: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.post_id, c.body, c.created_at,
                   u.id AS author_id, u.username, u.display_name, u.avatar_url
            FROM comments c
            INNER JOIN users u ON u.id = c.author_id
            WHERE c.post_id = $1
            ORDER BY c.created_at ASC, c.id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(parent)
        .bind(i64::from(limit))
        .bind(to_sql_offset(offset)?)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn count_children(&self, parent: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(parent)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        to_count(count)
    }
}

#[async_trait]
impl ChildSource<ReplyRecord> for PostgresRepositories {
    async fn list_children(
        &self,
        parent: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<ReplyRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReplyRow>(
            r#"
            SELECT r.id, r.comment_id, r.post_id, r.body, r.created_at,
                   u.id AS author_id, u.username, u.display_name, u.avatar_url
            FROM replies r
            INNER JOIN users u ON u.id = r.author_id
            WHERE r.comment_id = $1
            ORDER BY r.created_at ASC, r.id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(parent)
        .bind(i64::from(limit))
        .bind(to_sql_offset(offset)?)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ReplyRecord::from).collect())
    }

    async fn count_children(&self, parent: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM replies WHERE comment_id = $1")
            .bind(parent)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        to_count(count)
    }
}
