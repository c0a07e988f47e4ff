//! In-process backend built on `moka`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use tokio::sync::Mutex;

use super::{WindowHit, window_ms};

/// Upper bound on stored values and rate limit windows.
const MAX_ENTRIES: u64 = 100_000;

/// Idle time after which an untouched rate limit window is dropped.
const WINDOW_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
struct Entry {
    value: Arc<str>,
    ttl: Duration,
    expires_at: Instant,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: Arc::from(value),
            ttl,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

/// Expire each entry after its own time-to-live.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

type HitLog = Arc<Mutex<VecDeque<i64>>>;

/// In-process key-value store.
///
/// State is per process: two instances do not share cache entries, tokens or
/// rate limit windows.
#[derive(Clone)]
pub struct MemoryStore {
    values: Cache<String, Entry>,
    windows: Cache<String, HitLog>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .expire_after(PerEntryTtl)
                .build(),
            windows: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_idle(WINDOW_IDLE)
                .build(),
        }
    }

    pub(super) async fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .await
            .filter(Entry::is_live)
            .map(|entry| entry.value.to_string())
    }

    pub(super) async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.values.insert(key.to_string(), Entry::new(value, ttl)).await;
    }

    pub(super) async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        // A lapsed entry may linger until moka evicts it
        if let Some(existing) = self.values.get(key).await
            && !existing.is_live()
        {
            self.values.invalidate(key).await;
        }

        self.values
            .entry(key.to_string())
            .or_insert_with(async { Entry::new(value, ttl) })
            .await
            .is_fresh()
    }

    pub(super) async fn take(&self, key: &str) -> Option<String> {
        self.values
            .remove(key)
            .await
            .filter(Entry::is_live)
            .map(|entry| entry.value.to_string())
    }

    pub(super) async fn record_hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> WindowHit {
        let log = self
            .windows
            .get_with(key.to_string(), async { HitLog::default() })
            .await;
        let mut log = log.lock().await;

        let window_ms = window_ms(window);
        let cutoff = now_ms.saturating_sub(window_ms);
        while log.front().is_some_and(|&at| at <= cutoff) {
            log.pop_front();
        }

        let recorded = u32::try_from(log.len()).unwrap_or(u32::MAX);
        let allowed = recorded < limit;
        if allowed {
            log.push_back(now_ms);
        }

        let oldest = log.front().copied().unwrap_or(now_ms);
        WindowHit {
            allowed,
            remaining: if allowed { limit - recorded - 1 } else { 0 },
            reset_at_ms: oldest.saturating_add(window_ms),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
