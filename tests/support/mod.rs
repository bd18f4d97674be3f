//! In-memory repository doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedline::application::feed::PostMediaRow;
use feedline::application::repos::{
    CandidateFilter, CandidateRepo, ContentWriteRepo, CreateCommentParams, CreateReplyParams,
    OverlaySource, RepoError, UpdatePostParams,
};
use feedline::cache::{
    AppendOutcome, CacheConfig, CacheError, ChildSource, KvStore, PageAppend, PageSeed,
    SnapshotSource,
};
use feedline::domain::entities::{
    AuthorCard, CandidateId, CommentRecord, MediaItem, PostOverlay, PostSnapshot, ReplyRecord,
};
use feedline::domain::types::MediaKind;
use time::OffsetDateTime;
use uuid::Uuid;

pub fn cache_config() -> CacheConfig {
    CacheConfig {
        ttl_jitter_percent: 0,
        ..Default::default()
    }
}

pub fn author(id: Uuid) -> AuthorCard {
    AuthorCard {
        id,
        username: format!("user-{}", id.simple()),
        display_name: "Test User".to_string(),
        avatar_url: None,
    }
}

pub fn post_rows(id: Uuid, author_id: Uuid, title: &str, media: usize) -> Vec<PostMediaRow> {
    let base = PostMediaRow {
        post_id: id,
        title: title.to_string(),
        description: format!("about {title}"),
        author: author(author_id),
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
        media: None,
    };
    if media == 0 {
        return vec![base];
    }
    (0..media)
        .map(|position| PostMediaRow {
            media: Some(MediaItem {
                id: Uuid::new_v4(),
                kind: MediaKind::Image,
                url: format!("https://cdn.example/{id}/{position}.jpg"),
                width: Some(1080),
                height: Some(1080),
                position: position as i32,
            }),
            ..base.clone()
        })
        .collect()
}

/// Post rows keyed by id, with call accounting.
#[derive(Default)]
pub struct MemoryPosts {
    rows: Mutex<HashMap<Uuid, Vec<PostMediaRow>>>,
    fetch_calls: AtomicUsize,
    fetched: Mutex<Vec<Vec<Uuid>>>,
    delay: Option<Duration>,
}

impl MemoryPosts {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn insert(&self, id: Uuid, author_id: Uuid, title: &str, media: usize) {
        self.rows
            .lock()
            .unwrap()
            .insert(id, post_rows(id, author_id, title, media));
    }

    pub fn retitle(&self, id: Uuid, title: &str) {
        if let Some(rows) = self.rows.lock().unwrap().get_mut(&id) {
            for row in rows {
                row.title = title.to_string();
            }
        }
    }

    pub fn remove(&self, id: Uuid) {
        self.rows.lock().unwrap().remove(&id);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fetched_ids(&self) -> Vec<Vec<Uuid>> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotSource<PostSnapshot> for MemoryPosts {
    async fn fetch_rows(&self, ids: &[Uuid]) -> Result<Vec<PostMediaRow>, RepoError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(ids.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let rows = self.rows.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id))
            .flat_map(|rows| rows.iter().cloned())
            .collect())
    }
}

/// Ranked feed in a fixed order plus per-viewer follow lists.
#[derive(Default)]
pub struct MemoryCandidates {
    ranked: Mutex<Vec<CandidateId>>,
    tags: Mutex<HashMap<Uuid, String>>,
    follows: Mutex<HashMap<Uuid, Vec<CandidateId>>>,
    ranked_calls: AtomicUsize,
    boosted_calls: AtomicUsize,
}

impl MemoryCandidates {
    pub fn rank(&self, candidates: Vec<CandidateId>) {
        *self.ranked.lock().unwrap() = candidates;
    }

    pub fn tag(&self, id: Uuid, tag: &str) {
        self.tags.lock().unwrap().insert(id, tag.to_string());
    }

    pub fn boost_for(&self, viewer: Uuid, candidates: Vec<CandidateId>) {
        self.follows.lock().unwrap().insert(viewer, candidates);
    }

    pub fn ranked_calls(&self) -> usize {
        self.ranked_calls.load(Ordering::SeqCst)
    }

    pub fn boosted_calls(&self) -> usize {
        self.boosted_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateRepo for MemoryCandidates {
    async fn boosted_candidates(
        &self,
        viewer: Uuid,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError> {
        self.boosted_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .follows
            .lock()
            .unwrap()
            .get(&viewer)
            .map(|ids| ids.iter().take(limit as usize).copied().collect())
            .unwrap_or_default())
    }

    async fn ranked_candidates(
        &self,
        filter: &CandidateFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError> {
        self.ranked_calls.fetch_add(1, Ordering::SeqCst);
        let tags = self.tags.lock().unwrap();
        Ok(self
            .ranked
            .lock()
            .unwrap()
            .iter()
            .filter(|c| filter.author.is_none_or(|author| c.author_id == author))
            .filter(|c| {
                filter
                    .tag
                    .as_ref()
                    .is_none_or(|tag| tags.get(&c.id) == Some(tag))
            })
            .skip(offset as usize)
            .take(limit as usize)
            .copied()
            .collect())
    }
}

/// Live counters with a view tally bumped by `record_views`.
#[derive(Default)]
pub struct MemoryOverlays {
    overlays: Mutex<HashMap<Uuid, PostOverlay>>,
    liked_by: Mutex<HashSet<(Uuid, Uuid)>>,
    calls: AtomicUsize,
    view_delay: Option<Duration>,
}

impl MemoryOverlays {
    /// View increments land only after `delay`.
    pub fn with_view_delay(delay: Duration) -> Self {
        Self {
            view_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn set(&self, id: Uuid, overlay: PostOverlay) {
        self.overlays.lock().unwrap().insert(id, overlay);
    }

    pub fn like(&self, id: Uuid, viewer: Uuid) {
        self.liked_by.lock().unwrap().insert((id, viewer));
        self.overlays
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .like_count += 1;
    }

    pub fn views(&self, id: Uuid) -> i64 {
        self.overlays
            .lock()
            .unwrap()
            .get(&id)
            .map(|overlay| overlay.view_count)
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverlaySource<PostOverlay> for MemoryOverlays {
    async fn fetch_overlays(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> Result<HashMap<Uuid, PostOverlay>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let overlays = self.overlays.lock().unwrap();
        let liked_by = self.liked_by.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                let mut overlay = *overlays.get(id)?;
                overlay.is_liked = viewer.is_some_and(|viewer| liked_by.contains(&(*id, viewer)));
                Some((*id, overlay))
            })
            .collect())
    }

    async fn record_views(&self, ids: &[Uuid]) -> Result<(), RepoError> {
        if let Some(delay) = self.view_delay {
            tokio::time::sleep(delay).await;
        }
        let mut overlays = self.overlays.lock().unwrap();
        for id in ids {
            overlays.entry(*id).or_default().view_count += 1;
        }
        Ok(())
    }
}

/// A datastore that times out on every read, counting the attempts.
#[derive(Default)]
pub struct TimedOutSource {
    calls: AtomicUsize,
}

impl TimedOutSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RepoError::Timeout)
    }
}

#[async_trait]
impl SnapshotSource<PostSnapshot> for TimedOutSource {
    async fn fetch_rows(&self, _ids: &[Uuid]) -> Result<Vec<PostMediaRow>, RepoError> {
        self.fail()
    }
}

#[async_trait]
impl OverlaySource<PostOverlay> for TimedOutSource {
    async fn fetch_overlays(
        &self,
        _ids: &[Uuid],
        _viewer: Option<Uuid>,
    ) -> Result<HashMap<Uuid, PostOverlay>, RepoError> {
        self.fail()
    }
}

#[async_trait]
impl CandidateRepo for TimedOutSource {
    async fn boosted_candidates(
        &self,
        _viewer: Uuid,
        _limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError> {
        self.fail()
    }

    async fn ranked_candidates(
        &self,
        _filter: &CandidateFilter,
        _offset: u64,
        _limit: u32,
    ) -> Result<Vec<CandidateId>, RepoError> {
        self.fail()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> ChildSource<T> for TimedOutSource {
    async fn list_children(
        &self,
        _parent: Uuid,
        _offset: u64,
        _limit: u32,
    ) -> Result<Vec<T>, RepoError> {
        self.fail()
    }

    async fn count_children(&self, _parent: Uuid) -> Result<u64, RepoError> {
        self.fail()
    }
}

/// Children per parent in append order.
pub struct MemoryChildren<T> {
    children: Mutex<HashMap<Uuid, Vec<T>>>,
    list_calls: AtomicUsize,
    count_calls: AtomicUsize,
}

impl<T> Default for MemoryChildren<T> {
    fn default() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> MemoryChildren<T> {
    pub fn push(&self, parent: Uuid, item: T) {
        self.children
            .lock()
            .unwrap()
            .entry(parent)
            .or_default()
            .push(item);
    }

    pub fn retain(&self, parent: Uuid, keep: impl Fn(&T) -> bool) {
        if let Some(items) = self.children.lock().unwrap().get_mut(&parent) {
            items.retain(|item| keep(item));
        }
    }

    pub fn update(&self, parent: Uuid, apply: impl Fn(&mut T)) {
        if let Some(items) = self.children.lock().unwrap().get_mut(&parent) {
            items.iter_mut().for_each(apply);
        }
    }

    pub fn all(&self, parent: Uuid) -> Vec<T> {
        self.children
            .lock()
            .unwrap()
            .get(&parent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> ChildSource<T> for MemoryChildren<T>
where
    T: Clone + Send + Sync,
{
    async fn list_children(
        &self,
        parent: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<T>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .children
            .lock()
            .unwrap()
            .get(&parent)
            .map(|items| {
                items
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_children(&self, parent: Uuid) -> Result<u64, RepoError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .children
            .lock()
            .unwrap()
            .get(&parent)
            .map_or(0, |items| items.len() as u64))
    }
}

pub fn comment(post_id: Uuid, n: usize) -> CommentRecord {
    CommentRecord {
        id: Uuid::new_v4(),
        post_id,
        author: author(Uuid::from_u128(7)),
        body: format!("comment {n}"),
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

/// Write-side double backed by the child stores the page buffers read from.
pub struct MemoryWrites {
    posts: Mutex<HashSet<Uuid>>,
    pub comments: Arc<MemoryChildren<CommentRecord>>,
    pub replies: Arc<MemoryChildren<ReplyRecord>>,
    comment_parents: Mutex<HashMap<Uuid, Uuid>>,
    reply_parents: Mutex<HashMap<Uuid, Uuid>>,
    likes: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl MemoryWrites {
    pub fn new(
        comments: Arc<MemoryChildren<CommentRecord>>,
        replies: Arc<MemoryChildren<ReplyRecord>>,
    ) -> Self {
        Self {
            posts: Mutex::new(HashSet::new()),
            comments,
            replies,
            comment_parents: Mutex::new(HashMap::new()),
            reply_parents: Mutex::new(HashMap::new()),
            likes: Mutex::new(HashSet::new()),
        }
    }

    pub fn add_post(&self, id: Uuid) {
        self.posts.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl ContentWriteRepo for MemoryWrites {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        if !self.posts.lock().unwrap().contains(&params.post_id) {
            return Err(RepoError::NotFound);
        }
        let record = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            author: author(params.author_id),
            body: params.body,
            created_at: OffsetDateTime::now_utc(),
        };
        self.comment_parents
            .lock()
            .unwrap()
            .insert(record.id, record.post_id);
        self.comments.push(record.post_id, record.clone());
        Ok(record)
    }

    async fn create_reply(&self, params: CreateReplyParams) -> Result<ReplyRecord, RepoError> {
        let post_id = self
            .comment_parents
            .lock()
            .unwrap()
            .get(&params.comment_id)
            .copied()
            .ok_or(RepoError::NotFound)?;
        let record = ReplyRecord {
            id: Uuid::new_v4(),
            comment_id: params.comment_id,
            post_id,
            author: author(params.author_id),
            body: params.body,
            created_at: OffsetDateTime::now_utc(),
        };
        self.reply_parents
            .lock()
            .unwrap()
            .insert(record.id, record.comment_id);
        self.replies.push(record.comment_id, record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<bool, RepoError> {
        Ok(self.posts.lock().unwrap().contains(&params.id))
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.posts.lock().unwrap().remove(&id))
    }

    async fn update_comment(
        &self,
        id: Uuid,
        body: String,
    ) -> Result<Option<CommentRecord>, RepoError> {
        let Some(post_id) = self.comment_parents.lock().unwrap().get(&id).copied() else {
            return Ok(None);
        };
        self.comments.update(post_id, |comment| {
            if comment.id == id {
                comment.body = body.clone();
            }
        });
        Ok(self
            .comments
            .all(post_id)
            .into_iter()
            .find(|comment| comment.id == id))
    }

    async fn delete_comment(&self, id: Uuid) -> Result<Option<Uuid>, RepoError> {
        let post_id = self.comment_parents.lock().unwrap().remove(&id);
        if let Some(post_id) = post_id {
            self.comments.retain(post_id, |comment| comment.id != id);
        }
        Ok(post_id)
    }

    async fn delete_reply(&self, id: Uuid) -> Result<Option<Uuid>, RepoError> {
        let comment_id = self.reply_parents.lock().unwrap().remove(&id);
        if let Some(comment_id) = comment_id {
            self.replies.retain(comment_id, |reply| reply.id != id);
        }
        Ok(comment_id)
    }

    async fn set_like(&self, post_id: Uuid, user_id: Uuid, liked: bool) -> Result<bool, RepoError> {
        let mut likes = self.likes.lock().unwrap();
        Ok(if liked {
            likes.insert((post_id, user_id))
        } else {
            likes.remove(&(post_id, user_id))
        })
    }

    async fn set_save(&self, _post_id: Uuid, _user_id: Uuid, _saved: bool) -> Result<bool, RepoError> {
        Ok(true)
    }

    async fn set_follow(
        &self,
        _follower_id: Uuid,
        _followee_id: Uuid,
        _following: bool,
    ) -> Result<bool, RepoError> {
        Ok(true)
    }
}

/// A store whose every operation fails, standing in for an unreachable cache.
pub struct DownStore;

#[async_trait]
impl KvStore for DownStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn scan(
        &self,
        _cursor: u64,
        _pattern: &str,
        _batch_size: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn del(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn append_to_page(&self, _request: PageAppend<'_>) -> Result<AppendOutcome, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn seed_page(&self, _seed: PageSeed<'_>) -> Result<bool, CacheError> {
        Err(CacheError::backend("connection refused"))
    }
}
