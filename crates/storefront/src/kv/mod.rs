//! Key-value store shared by the vehicle cache, rate limiter and photo tokens.
//!
//! # Backends
//!
//! - `Redis` - managed Redis, shared by every instance (production)
//! - `Memory` - in-process `moka` cache, used when `REDIS_URL` is unset and in tests
//!
//! Both backends implement the same operations with the same expiry
//! semantics. Callers decide whether a failure is fatal: the vehicle cache and
//! the rate limiter degrade, the photo token store does not.

mod memory;
mod redis;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors that can occur when talking to the key-value store.
#[derive(Debug, Error)]
pub enum KvError {
    /// Redis command or connection failed.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of recording a hit in a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Whether the hit fit in the window (and was recorded).
    pub allowed: bool,
    /// Hits left in the current window after this one.
    pub remaining: u32,
    /// Epoch milliseconds at which the oldest recorded hit leaves the window.
    pub reset_at_ms: i64,
}

/// Handle to the configured key-value backend.
///
/// Cheap to clone; both variants share their connection state internally.
#[derive(Clone)]
pub enum KvStore {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl KvStore {
    /// Select a backend from configuration.
    ///
    /// Opening a Redis client does not connect; connection failures surface
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns `KvError::Redis` if the Redis URL cannot be parsed.
    pub fn from_url(redis_url: Option<&SecretString>) -> Result<Self, KvError> {
        match redis_url {
            Some(url) => Ok(Self::Redis(RedisStore::open(url.expose_secret())?)),
            None => Ok(Self::in_memory()),
        }
    }

    /// An empty in-process store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// Backend name for health reports.
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
        }
    }

    /// Fetch a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match self {
            Self::Redis(store) => store.get(key).await,
            Self::Memory(store) => Ok(store.get(key).await),
        }
    }

    /// Store a value with a time-to-live, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        match self {
            Self::Redis(store) => store.set(key, value, ttl).await,
            Self::Memory(store) => {
                store.set(key, value, ttl).await;
                Ok(())
            }
        }
    }

    /// Store a value only if the key is absent. Returns `true` if stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        match self {
            Self::Redis(store) => store.set_if_absent(key, value, ttl).await,
            Self::Memory(store) => Ok(store.set_if_absent(key, value, ttl).await),
        }
    }

    /// Atomically fetch and delete a value.
    ///
    /// At most one caller observes the value, however many race for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        match self {
            Self::Redis(store) => store.take(key).await,
            Self::Memory(store) => Ok(store.take(key).await),
        }
    }

    /// Delete a value. Returns `true` if something was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn delete(&self, key: &str) -> Result<bool, KvError> {
        match self {
            Self::Redis(store) => store.delete(key).await,
            Self::Memory(store) => Ok(store.take(key).await.is_some()),
        }
    }

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn ping(&self) -> Result<(), KvError> {
        match self {
            Self::Redis(store) => store.ping().await,
            Self::Memory(_) => Ok(()),
        }
    }

    /// Record a hit in the sliding window stored under `key`.
    ///
    /// Hits older than `window` are discarded first. A hit is recorded only
    /// if fewer than `limit` hits remain in the window.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn record_hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowHit, KvError> {
        match self {
            Self::Redis(store) => store.record_hit(key, limit, window, now_ms).await,
            Self::Memory(store) => Ok(store.record_hit(key, limit, window, now_ms).await),
        }
    }

    /// Fetch and decode a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or the value is not
    /// valid JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        self.get(key)
            .await?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(KvError::from)
    }

    /// Encode and store a JSON value with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), KvError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }
}

/// Window length in milliseconds, saturating.
fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}
