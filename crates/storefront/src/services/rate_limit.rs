//! Sliding-window rate limiting for vehicle lookups.
//!
//! Each client gets `limit` lookups in any trailing `window`. Hits are recorded
//! in the key-value store so limits hold across instances when Redis is
//! configured. A failing store lets requests through.

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tracing::{instrument, warn};

use crate::kv::KvStore;

const KEY_PREFIX: &str = "ratelimit:vehicle-lookup:";

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix epoch milliseconds at which the oldest counted hit leaves the window.
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// Whole seconds until the window frees a slot, at least 1.
    #[must_use]
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let millis = u64::try_from(self.reset_at_ms.saturating_sub(now_ms)).unwrap_or(0);
        millis.div_ceil(1000).max(1)
    }

    /// Write the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(self.reset_at_ms));
    }
}

/// Per-client sliding-window limiter for the vehicle lookup endpoint.
#[derive(Clone)]
pub struct LookupRateLimiter {
    store: KvStore,
    limit: u32,
    window: Duration,
}

impl LookupRateLimiter {
    #[must_use]
    pub fn new(store: KvStore, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a lookup attempt for `client` and decide whether it may proceed.
    ///
    /// Returns `None` when the store could not be reached; callers should
    /// allow the request and omit rate limit headers.
    #[instrument(skip(self))]
    pub async fn check(&self, client: &str) -> Option<RateLimitDecision> {
        let key = format!("{KEY_PREFIX}{client}");
        let now_ms = chrono::Utc::now().timestamp_millis();

        match self
            .store
            .record_hit(&key, self.limit, self.window, now_ms)
            .await
        {
            Ok(hit) => Some(RateLimitDecision {
                allowed: hit.allowed,
                limit: self.limit,
                remaining: hit.remaining,
                reset_at_ms: hit.reset_at_ms,
            }),
            Err(e) => {
                warn!(error = %e, "Rate limit store unavailable, allowing request");
                None
            }
        }
    }
}
