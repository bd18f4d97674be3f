//! Key-value store abstraction and the in-process backend.
//!
//! Payloads are opaque bytes; the engine owns serialization. Backends must
//! provide the two page-buffer primitives atomically: `append_to_page`
//! performs the cursor read-modify-write in one step, and `seed_page`
//! installs a cursor only when none exists.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::config::CacheConfig;
use super::error::CacheError;
use super::lock::recover;
use super::pages::PageCursor;

/// Request to append one encoded item to the last page of a parent.
#[derive(Debug, Clone, Copy)]
pub struct PageAppend<'a> {
    pub cursor_key: &'a str,
    /// Page key without the page number, e.g. `comments:{parent}:page:`.
    pub page_key_prefix: &'a str,
    pub item: &'a [u8],
    /// Top-level `id` of the encoded item; an item already present in the
    /// last two pages is not appended again.
    pub item_id: &'a str,
    pub page_size: u32,
    pub ttl: Duration,
    /// Start a fresh chain at page 1 when the cursor is absent.
    pub init_if_missing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended {
        cursor: PageCursor,
        rolled_over: bool,
    },
    /// The item is already in the last page or the one before it; nothing was written.
    AlreadyPresent { cursor: PageCursor },
    /// No cursor was present and `init_if_missing` was false; nothing was written.
    CursorMissing,
}

/// Request to install a cursor and its last page in one step, only if no
/// cursor exists yet.
#[derive(Debug, Clone, Copy)]
pub struct PageSeed<'a> {
    pub cursor_key: &'a str,
    pub page_key: &'a str,
    pub bucket: &'a [u8],
    /// Key and bucket of the full page preceding the tail, if any.
    pub previous: Option<(&'a str, &'a [u8])>,
    pub cursor: PageCursor,
    pub ttl: Duration,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Values are returned positionally, one slot per requested key.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// One incremental scan step. A returned cursor of 0 ends the iteration.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        batch_size: usize,
    ) -> Result<(u64, Vec<String>), CacheError>;

    /// Returns the number of keys that existed and were removed.
    async fn del(&self, keys: &[String]) -> Result<u64, CacheError>;

    async fn append_to_page(&self, request: PageAppend<'_>) -> Result<AppendOutcome, CacheError>;

    /// Returns `false` when a cursor already existed and nothing was written.
    async fn seed_page(&self, seed: PageSeed<'_>) -> Result<bool, CacheError>;
}

/// Appends an encoded item to an encoded JSON array bucket.
///
/// A missing, empty or unrecognisable bucket becomes a single-item array.
pub(crate) fn splice_bucket(existing: Option<&[u8]>, item: &[u8]) -> Vec<u8> {
    let single = || {
        let mut out = Vec::with_capacity(item.len() + 2);
        out.push(b'[');
        out.extend_from_slice(item);
        out.push(b']');
        out
    };

    let Some(existing) = existing else {
        return single();
    };
    let trimmed = existing.trim_ascii();
    let Some(body) = trimmed
        .strip_prefix(b"[")
        .and_then(|rest| rest.strip_suffix(b"]"))
    else {
        return single();
    };
    if body.trim_ascii().is_empty() {
        return single();
    }

    let mut out = Vec::with_capacity(trimmed.len() + item.len() + 1);
    out.extend_from_slice(&trimmed[..trimmed.len() - 1]);
    out.push(b',');
    out.extend_from_slice(item);
    out.push(b']');
    out
}

/// Whether an encoded JSON array bucket contains an object whose `id` is `id`.
pub(crate) fn bucket_holds(bucket: &[u8], id: &str) -> bool {
    serde_json::from_slice::<Vec<serde_json::Value>>(bucket).is_ok_and(|items| {
        items
            .iter()
            .any(|item| item.get("id").and_then(serde_json::Value::as_str) == Some(id))
    })
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
    seq: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process store backed by an LRU map with per-entry expiry.
///
/// Scan cursors are insertion sequence numbers, so deleting keys between
/// scan steps never causes later keys to be skipped.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, Entry>>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        recover(self.entries.read(), "len")
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, value: Vec<u8>, ttl: Duration) -> Entry {
        Entry {
            value,
            expires_at: Instant::now() + ttl,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn live_value(
        entries: &mut LruCache<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<Vec<u8>> {
        let found = entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));
        match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = recover(self.entries.write(), "get");
        Ok(Self::live_value(&mut entries, key, Instant::now()))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        let now = Instant::now();
        let mut entries = recover(self.entries.write(), "mget");
        Ok(keys
            .iter()
            .map(|key| Self::live_value(&mut entries, key, now))
            .collect())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = self.entry(value, ttl);
        recover(self.entries.write(), "set").put(key.to_string(), entry);
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        batch_size: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        let now = Instant::now();
        let entries = recover(self.entries.read(), "scan");

        let mut window: Vec<(u64, &String, bool)> = entries
            .iter()
            .filter(|(_, entry)| entry.seq >= cursor)
            .map(|(key, entry)| (entry.seq, key, entry.is_live(now)))
            .collect();
        window.sort_unstable_by_key(|(seq, _, _)| *seq);

        let batch_size = batch_size.max(1);
        let next = if window.len() > batch_size {
            window[batch_size].0
        } else {
            0
        };
        let keys = window
            .into_iter()
            .take(batch_size)
            .filter(|(_, key, live)| *live && glob_match(pattern, key))
            .map(|(_, key, _)| key.clone())
            .collect();

        Ok((next, keys))
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = recover(self.entries.write(), "del");
        let removed = keys
            .iter()
            .filter_map(|key| entries.pop(key.as_str()))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn append_to_page(&self, request: PageAppend<'_>) -> Result<AppendOutcome, CacheError> {
        let now = Instant::now();
        let mut entries = recover(self.entries.write(), "append_to_page");

        let current = Self::live_value(&mut entries, request.cursor_key, now)
            .and_then(|raw| PageCursor::decode(&raw));
        let current = match current {
            Some(cursor) => cursor,
            None if request.init_if_missing => PageCursor::EMPTY,
            None => return Ok(AppendOutcome::CursorMissing),
        };

        let first_recent = current.last_page.saturating_sub(1).max(1);
        if (first_recent..=current.last_page).any(|page| {
            let key = format!("{}{page}", request.page_key_prefix);
            Self::live_value(&mut entries, &key, now)
                .is_some_and(|bucket| bucket_holds(&bucket, request.item_id))
        }) {
            return Ok(AppendOutcome::AlreadyPresent { cursor: current });
        }

        let (cursor, rolled_over) = current.advance(request.page_size);
        let page_key = format!("{}{}", request.page_key_prefix, cursor.last_page);
        let bucket = if rolled_over {
            splice_bucket(None, request.item)
        } else {
            let existing = Self::live_value(&mut entries, &page_key, now);
            splice_bucket(existing.as_deref(), request.item)
        };

        let bucket_entry = self.entry(bucket, request.ttl);
        let cursor_entry = self.entry(cursor.encode(), request.ttl);
        entries.put(page_key, bucket_entry);
        entries.put(request.cursor_key.to_string(), cursor_entry);

        Ok(AppendOutcome::Appended {
            cursor,
            rolled_over,
        })
    }

    async fn seed_page(&self, seed: PageSeed<'_>) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = recover(self.entries.write(), "seed_page");
        if Self::live_value(&mut entries, seed.cursor_key, now).is_some() {
            return Ok(false);
        }

        let bucket_entry = self.entry(seed.bucket.to_vec(), seed.ttl);
        let cursor_entry = self.entry(seed.cursor.encode(), seed.ttl);
        if let Some((key, bucket)) = seed.previous {
            let previous_entry = self.entry(bucket.to_vec(), seed.ttl);
            entries.put(key.to_string(), previous_entry);
        }
        entries.put(seed.page_key.to_string(), bucket_entry);
        entries.put(seed.cursor_key.to_string(), cursor_entry);
        Ok(true)
    }
}

/// Redis-style glob matching supporting `*` and `?`.
pub(crate) fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.as_bytes();
    let candidate = candidate.as_bytes();
    let (mut p, mut c) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, c));
                p += 1;
            }
            Some(&b) if b == b'?' || b == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match star {
                Some((star_p, star_c)) => {
                    p = star_p + 1;
                    c = star_c + 1;
                    star = Some((star_p, star_c + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|b| *b == b'*')
}
