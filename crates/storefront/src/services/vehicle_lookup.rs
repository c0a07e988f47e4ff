//! Cache-aside vehicle lookup.
//!
//! Lookups are served from the key-value store when possible. Only cache
//! misses count against the per-client rate limit and reach the vehicle
//! data API. Cache failures are logged and the lookup proceeds uncached.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use plateshield_core::{Registration, VehicleData};

use crate::kv::{KvError, KvStore};
use crate::vehicle_data::{VehicleDataClient, VehicleDataError};

use super::rate_limit::{LookupRateLimiter, RateLimitDecision};

/// Errors that can occur during a vehicle lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The client has used up its lookups for the current window.
    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    /// The vehicle data API call failed.
    #[error(transparent)]
    VehicleData(#[from] VehicleDataError),
}

/// A resolved vehicle and where it came from.
#[derive(Debug, Clone)]
pub struct LookupOutcome {
    pub vehicle: VehicleData,
    pub cached: bool,
    /// Limiter state for the request; `None` on a cache hit, for operator
    /// lookups, or if the limiter store was unreachable.
    pub rate_limit: Option<RateLimitDecision>,
}

/// Cache key for a registration.
#[must_use]
pub fn cache_key(registration: &Registration) -> String {
    format!("vehicle:{registration}")
}

/// Vehicle lookups with caching and rate limiting.
#[derive(Clone)]
pub struct VehicleLookupService {
    store: KvStore,
    client: VehicleDataClient,
    limiter: LookupRateLimiter,
    cache_ttl: Duration,
}

impl VehicleLookupService {
    #[must_use]
    pub fn new(
        store: KvStore,
        client: VehicleDataClient,
        limiter: LookupRateLimiter,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            client,
            limiter,
            cache_ttl,
        }
    }

    #[must_use]
    pub fn client(&self) -> &VehicleDataClient {
        &self.client
    }

    #[must_use]
    pub fn limiter(&self) -> &LookupRateLimiter {
        &self.limiter
    }

    /// Resolve a registration to a vehicle.
    ///
    /// `client` identifies the caller for rate limiting. Passing `None`
    /// skips the limiter; only operator tooling should do that.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::RateLimited` if the caller is over its limit,
    /// or `LookupError::VehicleData` if the API call fails.
    #[instrument(skip(self), fields(registration = %registration))]
    pub async fn lookup(
        &self,
        registration: &Registration,
        client: Option<&str>,
    ) -> Result<LookupOutcome, LookupError> {
        if let Some(vehicle) = self.cached(registration).await {
            debug!("Vehicle cache hit");
            return Ok(LookupOutcome {
                vehicle,
                cached: true,
                rate_limit: None,
            });
        }

        let rate_limit = match client {
            Some(client) => self.limiter.check(client).await,
            None => None,
        };
        if let Some(decision) = rate_limit
            && !decision.allowed
        {
            return Err(LookupError::RateLimited(decision));
        }

        let vehicle = self.client.lookup(registration).await?;
        info!(vehicle = %vehicle.display_name(), "Vehicle fetched from API");

        if let Err(e) = self
            .store
            .set_json(&cache_key(registration), &vehicle, self.cache_ttl)
            .await
        {
            warn!(error = %e, "Failed to cache vehicle lookup");
        }

        Ok(LookupOutcome {
            vehicle,
            cached: false,
            rate_limit,
        })
    }

    /// Read a cached vehicle, treating store errors and undecodable entries
    /// as a miss.
    pub async fn cached(&self, registration: &Registration) -> Option<VehicleData> {
        match self.store.get_json(&cache_key(registration)).await {
            Ok(vehicle) => vehicle,
            Err(e) => {
                warn!(error = %e, "Vehicle cache read failed, continuing uncached");
                None
            }
        }
    }

    /// Remove a cached vehicle. Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn purge(&self, registration: &Registration) -> Result<bool, KvError> {
        self.store.delete(&cache_key(registration)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::VehicleDataConfig;

    fn service(store: KvStore) -> VehicleLookupService {
        let client = VehicleDataClient::new(&VehicleDataConfig {
            api_key: None,
            package_name: "VehicleDetails".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        })
        .unwrap();
        let limiter = LookupRateLimiter::new(store.clone(), 1, Duration::from_secs(3600));
        VehicleLookupService::new(store, client, limiter, Duration::from_secs(60))
    }

    fn vehicle() -> VehicleData {
        VehicleData {
            registration: Registration::parse("AB12CDE").unwrap(),
            make: "Tesla".to_string(),
            model: "Model 3".to_string(),
            year: 2019,
            variant: None,
            body_style: None,
            fuel_type: None,
            vin: None,
        }
    }

    #[test]
    fn test_cache_key_is_normalized() {
        let spaced = Registration::parse("ab12 cde").unwrap();
        let compact = Registration::parse("AB12CDE").unwrap();
        assert_eq!(cache_key(&spaced), cache_key(&compact));
        assert_eq!(cache_key(&compact), "vehicle:AB12CDE");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_limiter_and_api() {
        let store = KvStore::in_memory();
        let service = service(store.clone());
        store
            .set_json("vehicle:AB12CDE", &vehicle(), Duration::from_secs(60))
            .await
            .unwrap();

        let registration = Registration::parse("ab12cde").unwrap();
        // The API key is unset, so reaching the API would fail
        for _ in 0..3 {
            let outcome = service.lookup(&registration, Some("client")).await.unwrap();
            assert!(outcome.cached);
            assert_eq!(outcome.vehicle, vehicle());
            assert!(outcome.rate_limit.is_none());
        }
    }

    #[tokio::test]
    async fn test_miss_is_rate_limited() {
        let service = service(KvStore::in_memory());
        let registration = Registration::parse("XY99ZZZ").unwrap();

        let first = service.lookup(&registration, Some("client")).await.unwrap_err();
        assert!(matches!(
            first,
            LookupError::VehicleData(VehicleDataError::NotConfigured)
        ));

        let second = service.lookup(&registration, Some("client")).await.unwrap_err();
        assert!(matches!(second, LookupError::RateLimited(d) if !d.allowed));
    }

    #[tokio::test]
    async fn test_operator_lookup_bypasses_limiter() {
        let service = service(KvStore::in_memory());
        let registration = Registration::parse("XY99ZZZ").unwrap();

        for _ in 0..3 {
            let err = service.lookup(&registration, None).await.unwrap_err();
            assert!(matches!(err, LookupError::VehicleData(_)));
        }
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_a_miss() {
        let store = KvStore::in_memory();
        let service = service(store.clone());
        store
            .set("vehicle:AB12CDE", "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let registration = Registration::parse("AB12CDE").unwrap();
        assert!(service.cached(&registration).await.is_none());
    }

    #[tokio::test]
    async fn test_purge() {
        let store = KvStore::in_memory();
        let service = service(store.clone());
        let registration = Registration::parse("AB12CDE").unwrap();
        store
            .set_json(&cache_key(&registration), &vehicle(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(service.purge(&registration).await.unwrap());
        assert!(!service.purge(&registration).await.unwrap());
    }
}
