use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{
    ContentWriteRepo, CreateCommentParams, CreateReplyParams, RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, ReplyRecord};

use super::PostgresRepositories;
use super::comments::{CommentRow, ReplyRow};
use super::util::map_sqlx_error;

impl PostgresRepositories {
    /// Insert or delete one membership row; returns whether anything changed.
    async fn toggle(
        &self,
        insert_sql: &'static str,
        delete_sql: &'static str,
        left: Uuid,
        right: Uuid,
        on: bool,
    ) -> Result<bool, RepoError> {
        let sql = if on { insert_sql } else { delete_sql };
        let result = sqlx::query(sql)
            .bind(left)
            .bind(right)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ContentWriteRepo for PostgresRepositories {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let post: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR KEY SHARE")
                .bind(params.post_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        if post.is_none() {
            return Err(RepoError::NotFound);
        }

        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (id, post_id, author_id, body)
                VALUES ($1, $2, $3, $4)
                RETURNING id, post_id, author_id, body, created_at
            )
            SELECT i.id, i.post_id, i.body, i.created_at,
                   u.id AS author_id, u.username, u.display_name, u.avatar_url
            FROM inserted i
            INNER JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.post_id)
        .bind(params.author_id)
        .bind(&params.body)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn create_reply(&self, params: CreateReplyParams) -> Result<ReplyRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let post_id: Option<Uuid> =
            sqlx::query_scalar("SELECT post_id FROM comments WHERE id = $1 FOR KEY SHARE")
                .bind(params.comment_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let Some(post_id) = post_id else {
            return Err(RepoError::NotFound);
        };

        let row = sqlx::query_as::<_, ReplyRow>(
            r#"
            WITH inserted AS (
                INSERT INTO replies (id, comment_id, post_id, author_id, body)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, comment_id, post_id, author_id, body, created_at
            )
            SELECT i.id, i.comment_id, i.post_id, i.body, i.created_at,
                   u.id AS author_id, u.username, u.display_name, u.avatar_url
            FROM inserted i
            INNER JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.comment_id)
        .bind(post_id)
        .bind(params.author_id)
        .bind(&params.body)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET title = $2, description = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(params.id)
        .bind(&params.title)
        .bind(&params.description)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_comment(
        &self,
        id: Uuid,
        body: String,
    ) -> Result<Option<CommentRecord>, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH updated AS (
                UPDATE comments SET body = $2, updated_at = now()
                WHERE id = $1
                RETURNING id, post_id, author_id, body, created_at
            )
            SELECT c.id, c.post_id, c.body, c.created_at,
                   u.id AS author_id, u.username, u.display_name, u.avatar_url
            FROM updated c
            INNER JOIN users u ON u.id = c.author_id
            "#,
        )
        .bind(id)
        .bind(body)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(CommentRecord::from))
    }

    async fn delete_comment(&self, id: Uuid) -> Result<Option<Uuid>, RepoError> {
        sqlx::query_scalar("DELETE FROM comments WHERE id = $1 RETURNING post_id")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_reply(&self, id: Uuid) -> Result<Option<Uuid>, RepoError> {
        sqlx::query_scalar("DELETE FROM replies WHERE id = $1 RETURNING comment_id")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn set_like(&self, post_id: Uuid, user_id: Uuid, liked: bool) -> Result<bool, RepoError> {
        self.toggle(
            "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            "DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2",
            post_id,
            user_id,
            liked,
        )
        .await
    }

    async fn set_save(&self, post_id: Uuid, user_id: Uuid, saved: bool) -> Result<bool, RepoError> {
        self.toggle(
            "INSERT INTO post_saves (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            "DELETE FROM post_saves WHERE post_id = $1 AND user_id = $2",
            post_id,
            user_id,
            saved,
        )
        .await
    }

    async fn set_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        following: bool,
    ) -> Result<bool, RepoError> {
        if follower_id == followee_id {
            return Err(RepoError::InvalidInput {
                message: "users cannot follow themselves".to_string(),
            });
        }
        self.toggle(
            "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            "DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2",
            follower_id,
            followee_id,
            following,
        )
        .await
    }
}
