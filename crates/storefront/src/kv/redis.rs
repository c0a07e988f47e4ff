//! Managed Redis backend.

use std::sync::Arc;
use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, Script};
use tracing::instrument;

use super::{KvError, WindowHit, window_ms};

/// Sliding log over a sorted set, evaluated atomically.
///
/// KEYS[1] = window key; ARGV = now (ms), window (ms), limit, unique member.
/// Returns `{allowed, remaining, reset_at_ms}`.
const SLIDING_WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)

local allowed = 0
if count < limit then
  redis.call('ZADD', key, now, ARGV[4])
  redis.call('PEXPIRE', key, window)
  count = count + 1
  allowed = 1
end

local oldest = now
local first = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if first[2] then
  oldest = tonumber(first[2])
end

local remaining = 0
if allowed == 1 then
  remaining = limit - count
end

return {allowed, remaining, oldest + window}
";

/// Redis-backed key-value store.
#[derive(Clone)]
pub struct RedisStore {
    inner: Arc<RedisStoreInner>,
}

struct RedisStoreInner {
    client: Client,
    sliding_window: Script,
}

impl RedisStore {
    /// Create a client for the given URL without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid Redis URL.
    pub fn open(url: &str) -> Result<Self, KvError> {
        Ok(Self {
            inner: Arc::new(RedisStoreInner {
                client: Client::open(url)?,
                sliding_window: Script::new(SLIDING_WINDOW_SCRIPT),
            }),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, KvError> {
        Ok(self.inner.client.get_multiplexed_async_connection().await?)
    }

    #[instrument(skip(self), level = "debug")]
    pub(super) async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug")]
    pub(super) async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.connection().await?;
        let () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    #[instrument(skip(self, value), level = "debug")]
    pub(super) async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(window_ms(ttl).max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// `GETDEL` (Redis 6.2+).
    #[instrument(skip(self), level = "debug")]
    pub(super) async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = ::redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    #[instrument(skip(self), level = "debug")]
    pub(super) async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    pub(super) async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.connection().await?;
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub(super) async fn record_hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowHit, KvError> {
        let mut conn = self.connection().await?;
        let member = format!("{now_ms}-{:016x}", rand::random::<u64>());

        let (allowed, remaining, reset_at_ms): (i64, i64, i64) = self
            .inner
            .sliding_window
            .key(key)
            .arg(now_ms)
            .arg(window_ms(window))
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowHit {
            allowed: allowed == 1,
            remaining: u32::try_from(remaining).unwrap_or(0),
            reset_at_ms,
        })
    }
}
