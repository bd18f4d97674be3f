use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::application::repos::{CandidateFilter, CandidateRepo, RepoError, SearchRepo};
use crate::domain::entities::CandidateId;
use crate::domain::types::FeedSort;

use super::PostgresRepositories;
use super::util::{map_sqlx_error, to_sql_offset};

const ENGAGEMENT_EXPR: &str = "((SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) * 2 \
    + (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) \
    + (SELECT COUNT(*) FROM post_saves s WHERE s.post_id = p.id))";

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: Uuid,
    author_id: Uuid,
}

impl From<CandidateRow> for CandidateId {
    fn from(row: CandidateRow) -> Self {
        CandidateId::new(row.id, row.author_id)
    }
}

impl PostgresRepositories {
    fn apply_candidate_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q CandidateFilter) {
        if let Some(author) = filter.author {
            qb.push(" AND p.author_id = ");
            qb.push_bind(author);
        }
        if let Some(tag) = filter.tag.as_ref() {
            qb.push(" AND EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag = ");
            qb.push_bind(tag);
            qb.push(")");
        }
    }

    fn push_window(qb: &mut QueryBuilder<'_, Postgres>, offset: i64, limit: u32) {
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);
    }

    async fn fetch_candidates(
        &self,
        mut qb: QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<CandidateId>, RepoError> {
        let rows = qb
            .build_query_as::<CandidateRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(CandidateId::from).collect())
    }
}

#[async_trait]
impl CandidateRepo for PostgresRepositories {
    async fn boosted_candidates(
        &self,
        viewer: Uuid,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError> {
        let rows = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT p.id, p.author_id
            FROM posts p
            INNER JOIN follows f ON f.followee_id = p.author_id
            WHERE f.follower_id = $1
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $2
            "#,
        )
        .bind(viewer)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CandidateId::from).collect())
    }

    async fn ranked_candidates(
        &self,
        filter: &CandidateFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError> {
        let offset = to_sql_offset(offset)?;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT p.id, p.author_id FROM posts p WHERE TRUE");
        Self::apply_candidate_filter(&mut qb, filter);

        match filter.sort {
            FeedSort::Recent => {
                qb.push(" ORDER BY p.created_at DESC, p.id DESC");
            }
            FeedSort::Engagement => {
                qb.push(" ORDER BY ");
                qb.push(ENGAGEMENT_EXPR);
                qb.push(" DESC, p.created_at DESC, p.id DESC");
            }
        }
        Self::push_window(&mut qb, offset, limit);

        self.fetch_candidates(qb).await
    }
}

#[async_trait]
impl SearchRepo for PostgresRepositories {
    async fn search(
        &self,
        query: &str,
        filter: &CandidateFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError> {
        let offset = to_sql_offset(offset)?;
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT p.id, p.author_id FROM posts p, websearch_to_tsquery('simple', ",
        );
        qb.push_bind(query);
        qb.push(") AS q WHERE p.search @@ q");
        Self::apply_candidate_filter(&mut qb, filter);
        qb.push(" ORDER BY ts_rank(p.search, q) DESC, p.created_at DESC, p.id DESC");
        Self::push_window(&mut qb, offset, limit);

        self.fetch_candidates(qb).await
    }
}
