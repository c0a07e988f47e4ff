//! Vehicle lookup endpoints.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use plateshield_core::{Registration, VehicleData};

use crate::error::Result;
use crate::middleware::ClientIp;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    #[serde(default)]
    pub registration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub success: bool,
    pub vehicle: VehicleData,
    pub cached: bool,
}

/// POST /api/vehicle-lookup - Resolve a registration to a vehicle.
///
/// Cached vehicles are returned without touching the rate limit. Misses
/// carry `X-RateLimit-*` headers.
#[instrument(skip(state, body))]
pub async fn lookup(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    body: std::result::Result<Json<LookupRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;
    let registration = Registration::parse(request.registration.as_deref().unwrap_or_default())?;

    let outcome = state
        .vehicle_lookup()
        .lookup(&registration, Some(&client))
        .await?;

    let mut response = Json(LookupResponse {
        success: true,
        vehicle: outcome.vehicle,
        cached: outcome.cached,
    })
    .into_response();

    if let Some(decision) = outcome.rate_limit {
        decision.apply_headers(response.headers_mut());
    }

    Ok(response)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupStatus {
    pub status: &'static str,
    pub vehicle_api: VehicleApiStatus,
    pub cache: CacheStatus,
    pub rate_limit: RateLimitStatus,
}

#[derive(Debug, Serialize)]
pub struct VehicleApiStatus {
    pub configured: bool,
    pub package: String,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub backend: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub limit: u32,
    pub window_seconds: u64,
}

/// GET /api/vehicle-lookup - Report lookup configuration.
///
/// Never exposes credentials, only whether they are set.
pub async fn lookup_status(State(state): State<AppState>) -> Json<LookupStatus> {
    let lookup = state.vehicle_lookup();
    let configured = lookup.client().is_configured();

    Json(LookupStatus {
        status: if configured { "ok" } else { "degraded" },
        vehicle_api: VehicleApiStatus {
            configured,
            package: lookup.client().package_name().to_string(),
        },
        cache: CacheStatus {
            backend: state.kv().backend_name(),
        },
        rate_limit: RateLimitStatus {
            limit: lookup.limiter().limit(),
            window_seconds: lookup.limiter().window().as_secs(),
        },
    })
}
