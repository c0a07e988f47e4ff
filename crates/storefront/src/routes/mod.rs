//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Readiness (key-value store ping)
//!
//! # Vehicle lookup
//! POST /api/vehicle-lookup     - Resolve a registration
//! GET  /api/vehicle-lookup     - Lookup configuration report
//!
//! # Photo upload (burst rate limited)
//! GET  /api/validate-token     - Check a photo upload token
//! POST /api/upload-photos      - Redeem a token with front/rear photos
//!
//! # Webhooks
//! POST /api/webhooks/orders    - Shopify orders/create
//! ```

pub mod health;
pub mod photos;
pub mod vehicle;
pub mod webhooks;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::middleware::token_rate_limiter;
use crate::state::AppState;

/// Create the photo token routes router.
pub fn photo_routes(max_upload_bytes: usize) -> Router<AppState> {
    let router = Router::new()
        .route("/validate-token", get(photos::validate_token))
        .route(
            "/upload-photos",
            post(photos::upload_photos).layer(DefaultBodyLimit::max(max_upload_bytes)),
        );

    match token_rate_limiter() {
        Some(limiter) => router.layer(limiter),
        None => {
            tracing::warn!("Token rate limiter misconfigured, serving without burst limit");
            router
        }
    }
}

/// Create all API routes for the storefront.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    let api = Router::new()
        .route(
            "/vehicle-lookup",
            post(vehicle::lookup).get(vehicle::lookup_status),
        )
        .route("/webhooks/orders", post(webhooks::order_created))
        .merge(photo_routes(max_upload_bytes));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api)
}
