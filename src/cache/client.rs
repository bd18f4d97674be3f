//! Fail-open cache client.
//!
//! Wraps a [`KvStore`] with operation timeouts, typed JSON decoding and
//! metrics. Read and write helpers never return errors: a backend failure or
//! timeout is logged and behaves like a miss. Only the mutation-side
//! primitives (append, seed, delete, sweep) report [`CacheError`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::Collection;
use super::redis_store::RedisStore;
use super::store::{AppendOutcome, KvStore, MemoryStore, PageAppend, PageSeed};

pub(crate) const METRIC_CACHE_HIT: &str = "feedline_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "feedline_cache_miss_total";
pub(crate) const METRIC_CACHE_DECODE_ERROR: &str = "feedline_cache_decode_error_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "feedline_cache_error_total";
pub(crate) const METRIC_CACHE_WRITE: &str = "feedline_cache_write_total";
pub(crate) const METRIC_CACHE_INVALIDATED: &str = "feedline_cache_invalidated_keys_total";

const HEALTH_KEY: &str = "feedline:health";

/// Result of a typed cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Hit(T),
    Absent,
    /// Present but undecodable; callers treat it as a miss.
    Malformed,
}

impl<T> Lookup<T> {
    pub fn into_hit(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Absent | Lookup::Malformed => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn KvStore>,
    op_timeout: Duration,
    scan_batch_size: usize,
    ttl_jitter_percent: u8,
}

impl CacheClient {
    pub fn new(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            op_timeout: config.op_timeout(),
            scan_batch_size: config.scan_batch_size(),
            ttl_jitter_percent: config.ttl_jitter_percent,
        }
    }

    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new(config)), config)
    }

    /// Connect to Redis when a URL is configured, otherwise use the in-memory store.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        match config.redis_url.as_deref() {
            Some(url) => {
                let store = RedisStore::connect(url).await?;
                Ok(Self::new(Arc::new(store), config))
            }
            None => {
                debug!("No redis_url configured; using in-memory cache store");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout { op }),
        }
    }

    /// Multi-get and decode. The result has one slot per key, in key order.
    pub async fn mget_json<T: DeserializeOwned>(
        &self,
        collection: Collection,
        keys: &[String],
    ) -> Vec<Lookup<T>> {
        if keys.is_empty() {
            return Vec::new();
        }

        let raw = match self.bounded("mget", self.store.mget(keys)).await {
            Ok(raw) if raw.len() == keys.len() => raw,
            Ok(raw) => {
                warn!(
                    collection = %collection,
                    expected = keys.len(),
                    returned = raw.len(),
                    "Cache multi-get returned a mismatched number of values; treating as misses"
                );
                self.record_error(collection);
                vec![None; keys.len()]
            }
            Err(err) => {
                warn!(
                    collection = %collection,
                    keys = keys.len(),
                    error = %err,
                    "Cache multi-get failed; treating as misses"
                );
                self.record_error(collection);
                vec![None; keys.len()]
            }
        };

        let lookups: Vec<Lookup<T>> = keys
            .iter()
            .zip(raw)
            .map(|(key, value)| decode(collection, key, value))
            .collect();

        let hits = lookups.iter().filter(|lookup| lookup.is_hit()).count();
        let misses = lookups.len() - hits;
        counter!(METRIC_CACHE_HIT, "collection" => collection.as_str()).increment(hits as u64);
        counter!(METRIC_CACHE_MISS, "collection" => collection.as_str()).increment(misses as u64);
        debug!(collection = %collection, hits, misses, "Cache multi-get");

        lookups
    }

    pub async fn get_json<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Lookup<T> {
        let raw = match self.bounded("get", self.store.get(key)).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(collection = %collection, key, error = %err, "Cache get failed; treating as miss");
                self.record_error(collection);
                None
            }
        };

        let lookup = decode(collection, key, raw);
        let metric = if lookup.is_hit() {
            METRIC_CACHE_HIT
        } else {
            METRIC_CACHE_MISS
        };
        counter!(metric, "collection" => collection.as_str()).increment(1);
        lookup
    }

    /// Serialize and store a value. Failures are logged and reported as `false`.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let payload = match serde_json::to_vec(value).map_err(CacheError::encode) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(collection = %collection, key, error = %err, "Failed to encode cache payload");
                self.record_error(collection);
                return false;
            }
        };

        match self.bounded("set", self.store.set(key, payload, ttl)).await {
            Ok(()) => {
                counter!(METRIC_CACHE_WRITE, "collection" => collection.as_str()).increment(1);
                true
            }
            Err(err) => {
                warn!(collection = %collection, key, error = %err, "Cache write failed; continuing");
                self.record_error(collection);
                false
            }
        }
    }

    /// Base TTL plus a random extra of up to the configured jitter percentage.
    pub fn jittered(&self, base: Duration) -> Duration {
        if self.ttl_jitter_percent == 0 {
            return base;
        }
        let max_extra = base.as_secs() * u64::from(self.ttl_jitter_percent) / 100;
        if max_extra == 0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        base + Duration::from_secs(extra)
    }

    pub async fn append(&self, request: PageAppend<'_>) -> Result<AppendOutcome, CacheError> {
        self.bounded("append_to_page", self.store.append_to_page(request))
            .await
    }

    pub async fn seed(&self, seed: PageSeed<'_>) -> Result<bool, CacheError> {
        self.bounded("seed_page", self.store.seed_page(seed)).await
    }

    pub async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.bounded("del", self.store.del(keys)).await?;
        counter!(METRIC_CACHE_INVALIDATED).increment(removed);
        Ok(removed)
    }

    /// Delete every key matching `pattern`, one scan batch at a time, until the
    /// scan cursor returns to zero. Returns the number of keys removed.
    pub async fn sweep(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut cursor = 0_u64;
        let mut removed = 0_u64;
        loop {
            let (next, keys) = self
                .bounded("scan", self.store.scan(cursor, pattern, self.scan_batch_size))
                .await?;
            removed += self.delete(&keys).await?;
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        debug!(pattern, deleted = removed, "Cache sweep");
        Ok(removed)
    }

    /// Round-trip a read against the store.
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded("get", self.store.get(HEALTH_KEY)).await?;
        Ok(())
    }

    fn record_error(&self, collection: Collection) {
        counter!(METRIC_CACHE_ERROR, "collection" => collection.as_str()).increment(1);
    }
}

fn decode<T: DeserializeOwned>(collection: Collection, key: &str, raw: Option<Vec<u8>>) -> Lookup<T> {
    let Some(raw) = raw else {
        return Lookup::Absent;
    };
    match serde_json::from_slice(&raw) {
        Ok(value) => Lookup::Hit(value),
        Err(err) => {
            warn!(collection = %collection, key, error = %err, "Discarding malformed cache entry");
            counter!(METRIC_CACHE_DECODE_ERROR, "collection" => collection.as_str()).increment(1);
            Lookup::Malformed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CacheClient {
        CacheClient::in_memory(&CacheConfig::default())
    }

    #[tokio::test]
    async fn malformed_entry_is_reported_not_raised() {
        let client = client();
        client
            .store()
            .set("posts:1", b"{not json".to_vec(), Duration::from_secs(60))
            .await
            .expect("raw set");

        let lookup: Lookup<Vec<u32>> = client.get_json(Collection::POSTS, "posts:1").await;
        assert_eq!(lookup, Lookup::Malformed);
        assert_eq!(lookup.into_hit(), None);
    }

    #[tokio::test]
    async fn typed_round_trip_through_store() {
        let client = client();
        assert!(
            client
                .set_json(Collection::POSTS, "posts:2", &vec![1_u32, 2], Duration::from_secs(60))
                .await
        );

        let lookups: Vec<Lookup<Vec<u32>>> = client
            .mget_json(Collection::POSTS, &["posts:2".to_string(), "posts:3".to_string()])
            .await;
        assert_eq!(lookups, vec![Lookup::Hit(vec![1, 2]), Lookup::Absent]);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let client = client();
        let base = Duration::from_secs(1000);
        for _ in 0..50 {
            let ttl = client.jittered(base);
            assert!(ttl >= base && ttl <= Duration::from_secs(1100));
        }
    }

    #[test]
    fn zero_jitter_keeps_base() {
        let config = CacheConfig {
            ttl_jitter_percent: 0,
            ..Default::default()
        };
        let client = CacheClient::in_memory(&config);
        assert_eq!(client.jittered(Duration::from_secs(30)), Duration::from_secs(30));
    }
}
