//! Redis-backed rate store for multi-instance deployments.
//!
//! Each identifier is a hash at `ratelimit:<identifier>` with `count` and
//! `window_start` fields. The check-and-increment runs as one Lua script so
//! every instance sees the same serialized sequence of decisions. Keys carry
//! a `PEXPIRE` of one window length plus a millisecond: a record still
//! counts at exactly `start + window`, and Redis evicts it once it can no
//! longer affect a decision.

use std::time::Duration;

use redis::aio::ConnectionManager;

use super::store::{Admission, RateRecord, RateStore, StoreError, window_ms};

const KEY_PREFIX: &str = "ratelimit:";

const CHECK_AND_INCREMENT_LUA: &str = r"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local count = tonumber(redis.call('HGET', key, 'count') or '0')
local start = tonumber(redis.call('HGET', key, 'window_start') or '0')
if count == 0 or now - start > window then
  redis.call('HSET', key, 'count', 1, 'window_start', now)
  redis.call('PEXPIRE', key, window + 1)
  return {1, 1, now}
end
if count >= limit then
  return {0, count, start}
end
count = redis.call('HINCRBY', key, 'count', 1)
return {1, count, start}
";

pub struct RedisRateStore {
    conn: ConnectionManager,
    script: redis::Script,
    /// TTL applied to records written through `set`.
    ttl: Duration,
}

impl RedisRateStore {
    /// Connect to `url` and prepare the admission script. `window` is the
    /// TTL given to records written through [`RateStore::set`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str, window: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, script: redis::Script::new(CHECK_AND_INCREMENT_LUA), ttl: window })
    }
}

pub(crate) fn record_key(identifier: &str) -> String {
    format!("{KEY_PREFIX}{identifier}")
}

/// Key TTL for `window`. Expiry is strictly after the window ends.
pub(crate) fn ttl_ms(window: Duration) -> u64 {
    window_ms(window).saturating_add(1)
}

#[async_trait::async_trait]
impl RateStore for RedisRateStore {
    async fn get(&self, identifier: &str) -> Result<Option<RateRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let (count, window_start_ms): (Option<u32>, Option<u64>) = redis::cmd("HMGET")
            .arg(record_key(identifier))
            .arg("count")
            .arg("window_start")
            .query_async(&mut conn)
            .await?;
        match (count, window_start_ms) {
            (Some(count), Some(window_start_ms)) => {
                Ok(Some(RateRecord { identifier: identifier.to_owned(), count, window_start_ms }))
            }
            (None, None) => Ok(None),
            _ => Err(StoreError::Corrupt {
                identifier: identifier.to_owned(),
                detail: "hash is missing count or window_start".into(),
            }),
        }
    }

    async fn set(&self, record: RateRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = record_key(&record.identifier);
        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("count")
            .arg(record.count)
            .arg("window_start")
            .arg(record.window_start_ms)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&key)
            .arg(ttl_ms(self.ttl))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn check_and_increment(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        now_ms: u64,
    ) -> Result<Admission, StoreError> {
        let mut conn = self.conn.clone();
        let (allowed, count, window_start_ms): (i64, u32, u64) = self
            .script
            .key(record_key(identifier))
            .arg(limit)
            .arg(window_ms(window))
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(Admission { allowed: allowed == 1, count, window_start_ms })
    }
}
