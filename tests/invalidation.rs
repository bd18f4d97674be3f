//! Write paths: appends on create, invalidation on edit and delete.

mod support;

use std::sync::Arc;
use std::time::Duration;

use feedline::application::content::{ContentError, ContentService};
use feedline::application::repos::UpdatePostParams;
use feedline::cache::keys::{page_cursor_key, page_key, snapshot_key};
use feedline::cache::{CacheClient, CacheConfig, Collection, Invalidator, KvStore, PageBuffer};
use feedline::domain::entities::{CommentRecord, ReplyRecord};
use feedline::domain::error::DomainError;
use support::{MemoryChildren, MemoryWrites, cache_config};
use uuid::Uuid;

struct Harness {
    cache: CacheClient,
    writes: Arc<MemoryWrites>,
    comments: Arc<PageBuffer<CommentRecord>>,
    replies: Arc<PageBuffer<ReplyRecord>>,
    content: ContentService,
}

fn harness() -> Harness {
    let cache = CacheClient::in_memory(&cache_config());
    let comment_source = Arc::new(MemoryChildren::default());
    let reply_source = Arc::new(MemoryChildren::default());
    let writes = Arc::new(MemoryWrites::new(
        comment_source.clone(),
        reply_source.clone(),
    ));

    let ttl = Duration::from_secs(600);
    let comments = Arc::new(PageBuffer::new(
        cache.clone(),
        comment_source,
        Collection::COMMENTS,
        5,
        ttl,
    ));
    let replies = Arc::new(PageBuffer::new(
        cache.clone(),
        reply_source,
        Collection::REPLIES,
        5,
        ttl,
    ));
    let content = ContentService::new(
        writes.clone(),
        comments.clone(),
        replies.clone(),
        Invalidator::new(cache.clone()),
    );

    Harness {
        cache,
        writes,
        comments,
        replies,
        content,
    }
}

async fn exists(cache: &CacheClient, key: &str) -> bool {
    cache.store().get(key).await.expect("store read").is_some()
}

#[tokio::test]
async fn created_comments_are_readable_from_cache() {
    let h = harness();
    let post = Uuid::new_v4();
    let author = Uuid::new_v4();
    h.writes.add_post(post);

    for n in 0..7 {
        h.content
            .create_comment(post, author, &format!("  comment {n}  "))
            .await
            .expect("create comment");
    }

    let first = h.comments.read_page(post, 1).await.expect("page 1");
    let second = h.comments.read_page(post, 2).await.expect("page 2");
    assert!(first.from_cache && second.from_cache);
    assert_eq!(first.items.len(), 5);
    assert_eq!(second.items.len(), 2);
    assert_eq!(first.items[0].body, "comment 0");
    assert!(!second.has_more);
}

#[tokio::test]
async fn comment_on_missing_post_is_not_found() {
    let h = harness();
    let err = h
        .content
        .create_comment(Uuid::new_v4(), Uuid::new_v4(), "hello")
        .await
        .expect_err("post does not exist");
    assert!(matches!(err, ContentError::NotFound { entity: "post" }));
}

#[tokio::test]
async fn blank_comment_is_rejected_before_any_write() {
    let h = harness();
    let post = Uuid::new_v4();
    h.writes.add_post(post);

    let err = h
        .content
        .create_comment(post, Uuid::new_v4(), "   ")
        .await
        .expect_err("blank body");
    assert!(matches!(
        err,
        ContentError::Domain(DomainError::Validation { .. })
    ));
    assert!(h.writes.comments.all(post).is_empty());
}

#[tokio::test]
async fn deleting_a_comment_rebuilds_pages_from_the_datastore() {
    let h = harness();
    let post = Uuid::new_v4();
    let author = Uuid::new_v4();
    h.writes.add_post(post);

    let mut created = Vec::new();
    for n in 0..6 {
        created.push(
            h.content
                .create_comment(post, author, &format!("comment {n}"))
                .await
                .expect("create comment"),
        );
    }
    let reply = h
        .content
        .create_reply(created[0].id, author, "first reply")
        .await
        .expect("create reply");
    assert_eq!(reply.post_id, post);

    h.content
        .delete_comment(created[0].id)
        .await
        .expect("delete comment");

    assert!(!exists(&h.cache, &page_cursor_key(Collection::COMMENTS, post)).await);
    assert!(!exists(&h.cache, &page_key(Collection::REPLIES, created[0].id, 1)).await);

    let page = h.comments.read_page(post, 1).await.expect("rebuilt page");
    assert!(!page.from_cache);
    assert_eq!(page.items[0].body, "comment 1");
    assert_eq!(page.items.len(), 5);
    assert!(!page.has_more);
}

#[tokio::test]
async fn editing_a_comment_is_visible_on_next_read() {
    let h = harness();
    let post = Uuid::new_v4();
    h.writes.add_post(post);
    let created = h
        .content
        .create_comment(post, Uuid::new_v4(), "tpyo")
        .await
        .expect("create comment");

    h.content
        .update_comment(created.id, "typo")
        .await
        .expect("update comment");

    let page = h.comments.read_page(post, 1).await.expect("page 1");
    assert_eq!(page.items[0].body, "typo");
}

#[tokio::test]
async fn deleting_a_reply_invalidates_only_its_comment() {
    let h = harness();
    let post = Uuid::new_v4();
    let author = Uuid::new_v4();
    h.writes.add_post(post);
    let comment = h
        .content
        .create_comment(post, author, "parent")
        .await
        .expect("create comment");
    let reply = h
        .content
        .create_reply(comment.id, author, "child")
        .await
        .expect("create reply");

    h.content.delete_reply(reply.id).await.expect("delete reply");

    assert!(exists(&h.cache, &page_cursor_key(Collection::COMMENTS, post)).await);
    assert!(!exists(&h.cache, &page_cursor_key(Collection::REPLIES, comment.id)).await);
    let replies = h.replies.read_page(comment.id, 1).await.expect("replies");
    assert!(replies.items.is_empty());
}

#[tokio::test]
async fn post_edits_and_deletes_drop_cached_entries() {
    let h = harness();
    let post = Uuid::new_v4();
    h.writes.add_post(post);
    h.content
        .create_comment(post, Uuid::new_v4(), "hi")
        .await
        .expect("create comment");

    let snapshot = snapshot_key(Collection::POSTS, post);
    h.cache
        .store()
        .set(&snapshot, b"{}".to_vec(), Duration::from_secs(60))
        .await
        .expect("plant snapshot");

    h.content
        .update_post(UpdatePostParams {
            id: post,
            title: "new".into(),
            description: String::new(),
        })
        .await
        .expect("update post");
    assert!(!exists(&h.cache, &snapshot).await);
    assert!(exists(&h.cache, &page_cursor_key(Collection::COMMENTS, post)).await);

    h.content.delete_post(post).await.expect("delete post");
    assert!(!exists(&h.cache, &page_cursor_key(Collection::COMMENTS, post)).await);
    assert!(!exists(&h.cache, &page_key(Collection::COMMENTS, post, 1)).await);

    let err = h.content.delete_post(post).await.expect_err("already gone");
    assert!(matches!(err, ContentError::NotFound { entity: "post" }));
}

#[tokio::test]
async fn parent_sweep_spans_scan_batches_and_spares_other_parents() {
    let cache = CacheClient::in_memory(&CacheConfig {
        scan_batch_size: 2,
        ..cache_config()
    });
    let store = cache.store();
    let ttl = Duration::from_secs(60);
    let target = Uuid::new_v4();
    let bystander = Uuid::new_v4();

    for page in 1..=5 {
        store
            .set(&page_key(Collection::COMMENTS, target, page), b"[]".to_vec(), ttl)
            .await
            .expect("set page");
    }
    store
        .set(&page_cursor_key(Collection::COMMENTS, target), b"{}".to_vec(), ttl)
        .await
        .expect("set cursor");
    store
        .set(&snapshot_key(Collection::POSTS, target), b"{}".to_vec(), ttl)
        .await
        .expect("set snapshot");
    store
        .set(&page_key(Collection::COMMENTS, bystander, 1), b"[]".to_vec(), ttl)
        .await
        .expect("set other page");

    let report = Invalidator::new(cache.clone())
        .invalidate_parent(Collection::COMMENTS, target, Some(Collection::POSTS))
        .await
        .expect("invalidate");

    assert_eq!(report.total(), 7);
    assert!(exists(&cache, &page_key(Collection::COMMENTS, bystander, 1)).await);
    assert!(!exists(&cache, &snapshot_key(Collection::POSTS, target)).await);
}
