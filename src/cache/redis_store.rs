//! Redis backend for [`KvStore`].
//!
//! The page primitives run as Lua scripts so the cursor read-modify-write and
//! the bucket write happen in a single server-side step.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use tracing::info;

use super::error::CacheError;
use super::pages::PageCursor;
use super::store::{AppendOutcome, KvStore, PageAppend, PageSeed};

// KEYS[1] cursor key
// ARGV[1] encoded item, ARGV[2] page size, ARGV[3] ttl seconds,
// ARGV[4] "1" to start a chain when the cursor is absent, ARGV[5] page key prefix,
// ARGV[6] item id
const APPEND_SCRIPT: &str = r#"
local function holds(key, id)
  local raw = redis.call('GET', key)
  if not raw then
    return false
  end
  local ok, items = pcall(cjson.decode, raw)
  if not ok or type(items) ~= 'table' then
    return false
  end
  for _, item in ipairs(items) do
    if type(item) == 'table' and item['id'] == id then
      return true
    end
  end
  return false
end

local count, last = 0, 1
local present = false
local raw = redis.call('GET', KEYS[1])
if raw then
  local ok, cursor = pcall(cjson.decode, raw)
  if ok and type(cursor) == 'table' then
    local c = tonumber(cursor['countInLastPage'])
    local l = tonumber(cursor['lastPage'])
    if c and l and c >= 0 and l >= 1 then
      count, last, present = c, l, true
    end
  end
end
if not present and ARGV[4] ~= '1' then
  return {0, 0, 0, 0}
end

if holds(ARGV[5] .. last, ARGV[6]) or (last > 1 and holds(ARGV[5] .. (last - 1), ARGV[6])) then
  return {2, count, last, 0}
end

local page_size = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])
local rolled = 0
local bucket
if count >= page_size then
  last = last + 1
  count = 1
  rolled = 1
  bucket = '[' .. ARGV[1] .. ']'
else
  count = count + 1
  local existing = redis.call('GET', ARGV[5] .. last)
  local body = existing and string.match(existing, '^%s*%[(.*)%]%s*$')
  if body and string.match(body, '%S') then
    local head = string.match(existing, '^(.*)%]%s*$')
    bucket = head .. ',' .. ARGV[1] .. ']'
  else
    bucket = '[' .. ARGV[1] .. ']'
  end
end

redis.call('SET', ARGV[5] .. last, bucket, 'EX', ttl)
redis.call('SET', KEYS[1], string.format('{"countInLastPage":%d,"lastPage":%d}', count, last), 'EX', ttl)
return {1, count, last, rolled}
"#;

// KEYS[1] cursor key, KEYS[2] page key, KEYS[3] previous page key (optional)
// ARGV[1] bucket, ARGV[2] encoded cursor, ARGV[3] ttl seconds, ARGV[4] previous bucket
const SEED_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[2], 'NX', 'EX', ARGV[3]) then
  redis.call('SET', KEYS[2], ARGV[1], 'EX', ARGV[3])
  if KEYS[3] then
    redis.call('SET', KEYS[3], ARGV[4], 'EX', ARGV[3])
  end
  return 1
end
return 0
"#;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    append: Script,
    seed: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(target: "feedline::cache::redis_store", "Connected to Redis cache");
        Ok(Self::with_connection(conn))
    }

    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            append: Script::new(APPEND_SCRIPT),
            seed: Script::new(SEED_SCRIPT),
        }
    }
}

fn script_cursor(count: i64, last: i64) -> Result<PageCursor, CacheError> {
    Ok(PageCursor {
        count_in_last_page: u32::try_from(count)
            .map_err(|_| CacheError::Script(format!("count {count}")))?,
        last_page: u32::try_from(last)
            .map_err(|_| CacheError::Script(format!("last page {last}")))?,
    })
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        if values.len() != keys.len() {
            return Err(CacheError::backend(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        batch_size: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        let mut conn = self.conn.clone();
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(batch_size.max(1))
            .query_async(&mut conn)
            .await?;
        Ok((next, keys))
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn append_to_page(&self, request: PageAppend<'_>) -> Result<AppendOutcome, CacheError> {
        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .append
            .key(request.cursor_key)
            .arg(request.item)
            .arg(request.page_size)
            .arg(ttl_secs(request.ttl))
            .arg(if request.init_if_missing { "1" } else { "0" })
            .arg(request.page_key_prefix)
            .arg(request.item_id)
            .invoke_async(&mut conn)
            .await?;

        match reply.as_slice() {
            [0, ..] => Ok(AppendOutcome::CursorMissing),
            [1, count, last, rolled] => Ok(AppendOutcome::Appended {
                cursor: script_cursor(*count, *last)?,
                rolled_over: *rolled == 1,
            }),
            [2, count, last, _] => Ok(AppendOutcome::AlreadyPresent {
                cursor: script_cursor(*count, *last)?,
            }),
            other => Err(CacheError::Script(format!("{other:?}"))),
        }
    }

    async fn seed_page(&self, seed: PageSeed<'_>) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.seed.key(seed.cursor_key);
        invocation
            .key(seed.page_key)
            .arg(seed.bucket)
            .arg(seed.cursor.encode())
            .arg(ttl_secs(seed.ttl));
        if let Some((key, bucket)) = seed.previous {
            invocation.key(key).arg(bucket);
        }
        let installed: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(installed == 1)
    }
}
