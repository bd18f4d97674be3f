//! Append-only page buffers for child collections.
//!
//! Each parent owns a chain of fixed-capacity buckets `page:1 .. page:N` and a
//! cursor recording the last page and how many items it holds. New children
//! are appended to the last bucket, rolling over to a fresh bucket when it is
//! full, so existing pages are never re-paginated.
//!
//! The chain and cursor are only ever written through the store's atomic
//! primitives. When a cache step fails, the parent's pages are swept so the
//! next read rebuilds them from the datastore.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::repos::RepoError;

use super::client::{CacheClient, Lookup};
use super::error::CacheError;
use super::keys::{Collection, page_cursor_key, page_key, page_key_prefix, parent_pattern};
use super::store::{AppendOutcome, PageAppend, PageSeed};

pub(crate) const METRIC_PAGE_APPEND: &str = "feedline_page_append_total";
pub(crate) const METRIC_PAGE_ROLLOVER: &str = "feedline_page_rollover_total";

/// Pointer to the tail of a parent's bucket chain.
///
/// Stored as `{"countInLastPage": <int>, "lastPage": <int>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub count_in_last_page: u32,
    pub last_page: u32,
}

impl PageCursor {
    /// Implied cursor of a parent with no children yet.
    pub const EMPTY: PageCursor = PageCursor {
        count_in_last_page: 0,
        last_page: 1,
    };

    /// Cursor after one more item, and whether that item opened a new page.
    pub fn advance(self, page_size: u32) -> (PageCursor, bool) {
        if self.count_in_last_page >= page_size {
            let next = PageCursor {
                count_in_last_page: 1,
                last_page: self.last_page.saturating_add(1),
            };
            (next, true)
        } else {
            let next = PageCursor {
                count_in_last_page: self.count_in_last_page + 1,
                last_page: self.last_page,
            };
            (next, false)
        }
    }

    /// Cursor of a chain holding `total` items; `None` for an empty chain.
    pub fn for_total(total: u64, page_size: u32) -> Option<PageCursor> {
        if total == 0 || page_size == 0 {
            return None;
        }
        let size = u64::from(page_size);
        let last = total.div_ceil(size);
        let count = total - size * (last - 1);
        Some(PageCursor {
            count_in_last_page: u32::try_from(count).ok()?,
            last_page: u32::try_from(last).ok()?,
        })
    }

    pub fn decode(raw: &[u8]) -> Option<PageCursor> {
        serde_json::from_slice::<PageCursor>(raw)
            .ok()
            .filter(|cursor| cursor.last_page >= 1)
    }

    pub fn encode(&self) -> Vec<u8> {
        format!(
            r#"{{"countInLastPage":{},"lastPage":{}}}"#,
            self.count_in_last_page, self.last_page
        )
        .into_bytes()
    }
}

/// A child that can live in a page bucket.
///
/// The identity must serialize as the item's top-level `id` field; appends
/// compare it against the tail pages so an item already seeded from the
/// datastore is not added twice.
pub trait PageItem: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn page_item_id(&self) -> Uuid;
}

/// Datastore listing of a parent's children in append order.
#[async_trait]
pub trait ChildSource<T>: Send + Sync {
    async fn list_children(&self, parent: Uuid, offset: u64, limit: u32)
    -> Result<Vec<T>, RepoError>;

    async fn count_children(&self, parent: Uuid) -> Result<u64, RepoError>;
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error("page numbers start at 1")]
    InvalidPage,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildPage<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub has_more: bool,
    #[serde(skip)]
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    Appended(PageCursor),
    /// The cursor was cold; the tail page was rebuilt from the datastore.
    Seeded(PageCursor),
    /// The item was already cached, seeded by a concurrent cold start.
    Present(PageCursor),
    /// Nothing was cached; the parent's pages were swept instead.
    Skipped,
}

pub struct PageBuffer<T> {
    cache: CacheClient,
    source: Arc<dyn ChildSource<T>>,
    collection: Collection,
    page_size: u32,
    ttl: Duration,
    _item: PhantomData<fn() -> T>,
}

impl<T: PageItem> PageBuffer<T> {
    pub fn new(
        cache: CacheClient,
        source: Arc<dyn ChildSource<T>>,
        collection: Collection,
        page_size: u32,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            collection,
            page_size: page_size.max(1),
            ttl,
            _item: PhantomData,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Append a child that has already been written to the datastore.
    pub async fn append(&self, parent: Uuid, item: &T) -> AppendResult {
        let item_id = item.page_item_id().to_string();
        let appended = match serde_json::to_vec(item).map_err(CacheError::encode) {
            Ok(encoded) => self
                .append_encoded(parent, &encoded, &item_id, false)
                .await
                .map(|outcome| (outcome, encoded)),
            Err(err) => Err(err),
        };

        match appended {
            Ok((AppendOutcome::CursorMissing, encoded)) => {
                self.append_cold(parent, &encoded, &item_id).await
            }
            Ok((outcome, _)) => self.settle(outcome),
            Err(err) => {
                warn!(collection = %self.collection, parent_id = %parent, error = %err, "Page append failed; sweeping parent pages");
                self.discard(parent).await;
                AppendResult::Skipped
            }
        }
    }

    /// Read page `n` (1-based), from the cache when possible.
    pub async fn read_page(&self, parent: Uuid, page: u32) -> Result<ChildPage<T>, PageError> {
        if page == 0 {
            return Err(PageError::InvalidPage);
        }

        let cursor_key = page_cursor_key(self.collection, parent);
        let bucket_key = page_key(self.collection, parent, page);
        let (cursor, bucket) = tokio::join!(
            self.cache.get_json::<PageCursor>(self.collection, &cursor_key),
            self.cache.get_json::<Vec<T>>(self.collection, &bucket_key),
        );
        let cursor = cursor.into_hit().filter(|cursor| cursor.last_page >= 1);

        if cursor.is_some_and(|cursor| page > cursor.last_page) {
            return Ok(ChildPage {
                items: Vec::new(),
                page,
                has_more: false,
                from_cache: true,
            });
        }

        if let Lookup::Hit(items) = bucket {
            let has_more = match cursor {
                Some(cursor) => page < cursor.last_page,
                None => items.len() >= self.page_size as usize,
            };
            debug!(collection = %self.collection, parent_id = %parent, page, "Page served from cache");
            return Ok(ChildPage {
                items,
                page,
                has_more,
                from_cache: true,
            });
        }

        let offset = u64::from(page - 1) * u64::from(self.page_size);
        let mut items = self
            .source
            .list_children(parent, offset, self.page_size + 1)
            .await?;
        let has_more = items.len() > self.page_size as usize;
        items.truncate(self.page_size as usize);

        // Only full pages are immutable under append; partial tails stay uncached.
        if items.len() == self.page_size as usize {
            self.cache
                .set_json(self.collection, &bucket_key, &items, self.ttl)
                .await;
        }

        Ok(ChildPage {
            items,
            page,
            has_more,
            from_cache: false,
        })
    }

    async fn append_encoded(
        &self,
        parent: Uuid,
        encoded: &[u8],
        item_id: &str,
        init_if_missing: bool,
    ) -> Result<AppendOutcome, CacheError> {
        let cursor_key = page_cursor_key(self.collection, parent);
        let prefix = page_key_prefix(self.collection, parent);
        self.cache
            .append(PageAppend {
                cursor_key: &cursor_key,
                page_key_prefix: &prefix,
                item: encoded,
                item_id,
                page_size: self.page_size,
                ttl: self.ttl,
                init_if_missing,
            })
            .await
    }

    async fn append_cold(&self, parent: Uuid, encoded: &[u8], item_id: &str) -> AppendResult {
        let total = match self.source.count_children(parent).await {
            Ok(total) => total,
            Err(err) => {
                warn!(collection = %self.collection, parent_id = %parent, error = %err, "Failed to count children for cold page cursor");
                self.discard(parent).await;
                return AppendResult::Skipped;
            }
        };

        if total > 1 {
            return self.seed_tail(parent, total).await;
        }

        match self.append_encoded(parent, encoded, item_id, true).await {
            Ok(outcome) => self.settle(outcome),
            Err(err) => {
                warn!(collection = %self.collection, parent_id = %parent, error = %err, "Page append failed; sweeping parent pages");
                self.discard(parent).await;
                AppendResult::Skipped
            }
        }
    }

    fn settle(&self, outcome: AppendOutcome) -> AppendResult {
        match outcome {
            AppendOutcome::Appended {
                cursor,
                rolled_over,
            } => {
                self.record_append(rolled_over);
                AppendResult::Appended(cursor)
            }
            AppendOutcome::AlreadyPresent { cursor } => {
                debug!(collection = %self.collection, last_page = cursor.last_page, "Item already in page buffer");
                AppendResult::Present(cursor)
            }
            AppendOutcome::CursorMissing => AppendResult::Skipped,
        }
    }

    /// Install the cursor together with the tail page and the full page before
    /// it, read in one range from the datastore.
    async fn seed_tail(&self, parent: Uuid, total: u64) -> AppendResult {
        let Some(expected) = PageCursor::for_total(total, self.page_size) else {
            return AppendResult::Skipped;
        };
        let size = self.page_size as usize;
        let has_previous = expected.last_page > 1;
        let first_page = if has_previous {
            expected.last_page - 1
        } else {
            expected.last_page
        };
        let offset = u64::from(first_page - 1) * u64::from(self.page_size);
        let limit = if has_previous {
            self.page_size.saturating_mul(2)
        } else {
            self.page_size
        };

        let mut items = match self.source.list_children(parent, offset, limit).await {
            Ok(items) => items,
            Err(err) => {
                warn!(collection = %self.collection, parent_id = %parent, error = %err, "Failed to load tail page for seeding");
                self.discard(parent).await;
                return AppendResult::Skipped;
            }
        };
        let tail = if has_previous {
            items.split_off(size.min(items.len()))
        } else {
            std::mem::take(&mut items)
        };
        // Children were deleted since the count; let readers rebuild instead.
        if tail.is_empty() || (has_previous && items.len() < size) {
            self.discard(parent).await;
            return AppendResult::Skipped;
        }

        let cursor = PageCursor {
            count_in_last_page: tail.len() as u32,
            last_page: expected.last_page,
        };
        let encoded = serde_json::to_vec(&tail).and_then(|bucket| {
            let previous = if has_previous {
                Some(serde_json::to_vec(&items)?)
            } else {
                None
            };
            Ok((bucket, previous))
        });
        let (bucket, previous) = match encoded.map_err(CacheError::encode) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(collection = %self.collection, parent_id = %parent, error = %err, "Failed to encode seeded page");
                self.discard(parent).await;
                return AppendResult::Skipped;
            }
        };

        let cursor_key = page_cursor_key(self.collection, parent);
        let tail_key = page_key(self.collection, parent, cursor.last_page);
        let previous_key = page_key(self.collection, parent, first_page);
        let seeded = self
            .cache
            .seed(PageSeed {
                cursor_key: &cursor_key,
                page_key: &tail_key,
                bucket: &bucket,
                previous: previous
                    .as_deref()
                    .map(|bucket| (previous_key.as_str(), bucket)),
                cursor,
                ttl: self.ttl,
            })
            .await;

        match seeded {
            Ok(true) => {
                debug!(collection = %self.collection, parent_id = %parent, last_page = cursor.last_page, "Seeded page cursor from datastore");
                self.record_append(false);
                AppendResult::Seeded(cursor)
            }
            Ok(false) => {
                // Another writer seeded first; its tail may predate our insert.
                self.discard(parent).await;
                AppendResult::Skipped
            }
            Err(err) => {
                warn!(collection = %self.collection, parent_id = %parent, error = %err, "Page seed failed; sweeping parent pages");
                self.discard(parent).await;
                AppendResult::Skipped
            }
        }
    }

    async fn discard(&self, parent: Uuid) {
        let pattern = parent_pattern(self.collection, parent);
        if let Err(err) = self.cache.sweep(&pattern).await {
            warn!(collection = %self.collection, parent_id = %parent, error = %err, "Failed to sweep parent pages");
        }
    }

    fn record_append(&self, rolled_over: bool) {
        counter!(METRIC_PAGE_APPEND, "collection" => self.collection.as_str()).increment(1);
        if rolled_over {
            counter!(METRIC_PAGE_ROLLOVER, "collection" => self.collection.as_str()).increment(1);
        }
    }
}
