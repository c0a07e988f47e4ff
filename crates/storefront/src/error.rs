//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All API handlers return
//! `Result<T, AppError>`; every error body is JSON of the form
//! `{"success": false, "error": "..."}`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use plateshield_core::{PhotoTokenError, RegistrationError};

use crate::kv::KvError;
use crate::services::{ImageError, LookupError, PhotoUrls, RateLimitDecision, UploadError};
use crate::shopify::webhook::WebhookError;
use crate::vehicle_data::VehicleDataError;

/// Machine-readable code for a photo upload whose order update failed.
pub const ORDER_UPDATE_FAILED: &str = "ORDER_UPDATE_FAILED";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (webhook signature).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body over the configured limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Client is over its rate limit.
    #[error("Rate limited")]
    RateLimited(RateLimitDecision),

    /// A dependency is down or not configured.
    #[error("Service unavailable: {detail}")]
    Unavailable {
        message: &'static str,
        detail: String,
    },

    /// An upstream service rejected the request.
    #[error("Upstream error: {detail}")]
    Upstream {
        message: &'static str,
        detail: String,
    },

    /// Photos were stored but the order could not be updated.
    #[error("Order update failed: {detail}")]
    OrderUpdateFailed { urls: PhotoUrls, detail: String },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::OrderUpdateFailed { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(
            self,
            Self::Unavailable { .. }
                | Self::Upstream { .. }
                | Self::OrderUpdateFailed { .. }
                | Self::Internal(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let body = match &self {
            Self::BadRequest(message)
            | Self::Unauthorized(message)
            | Self::NotFound(message)
            | Self::PayloadTooLarge(message) => {
                json!({ "success": false, "error": message })
            }
            Self::RateLimited(decision) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                json!({
                    "success": false,
                    "error": "Too many lookups. Please try again later.",
                    "reset": decision.reset_at_ms,
                    "retryAfter": decision.retry_after_secs(now_ms),
                })
            }
            Self::Unavailable { message, .. } | Self::Upstream { message, .. } => {
                json!({ "success": false, "error": message })
            }
            Self::OrderUpdateFailed { urls, .. } => json!({
                "success": false,
                "error": "Your photos were saved but we could not attach them to your order. We will do this for you.",
                "code": ORDER_UPDATE_FAILED,
                "urls": urls,
            }),
            Self::Internal(_) => json!({ "success": false, "error": "Internal server error" }),
        };

        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited(decision) = &self {
            decision.apply_headers(response.headers_mut());
            let retry_after = decision.retry_after_secs(chrono::Utc::now().timestamp_millis());
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<PhotoTokenError> for AppError {
    fn from(err: PhotoTokenError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        tracing::warn!(error = %err, "Rejected webhook");
        Self::Unauthorized(err.to_string())
    }
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        Self::Unavailable {
            message: "Token service is temporarily unavailable",
            detail: err.to_string(),
        }
    }
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::RateLimited(decision) => Self::RateLimited(decision),
            LookupError::VehicleData(VehicleDataError::NotFound(registration)) => {
                Self::NotFound(format!("No vehicle data found for {registration}"))
            }
            LookupError::VehicleData(VehicleDataError::Parse(detail)) => Self::Internal(detail),
            LookupError::VehicleData(err) => Self::Unavailable {
                message: "Vehicle lookup is temporarily unavailable",
                detail: err.to_string(),
            },
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TokenNotFound => {
                Self::NotFound("This upload link is invalid, expired or already used".to_string())
            }
            UploadError::TokenStore(err) => err.into(),
            UploadError::Cdn(err) => Self::Upstream {
                message: "Could not store your photos. Please try again.",
                detail: err.to_string(),
            },
            UploadError::OrderUpdate { urls, source } => Self::OrderUpdateFailed {
                urls,
                detail: source.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge("Request body is too large".to_string())
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

/// Map an image validation failure for one side of the vehicle.
pub fn image_error(side: &str, err: &ImageError) -> AppError {
    AppError::BadRequest(format!("{side} {err}"))
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_body() {
        let response = AppError::BadRequest("registration is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "registration is required");
    }

    #[tokio::test]
    async fn test_rate_limited_headers() {
        let reset = chrono::Utc::now().timestamp_millis() + 90_000;
        let response = AppError::RateLimited(RateLimitDecision {
            allowed: false,
            limit: 3,
            remaining: 0,
            reset_at_ms: reset,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert!(response.headers().contains_key(RETRY_AFTER));

        let body = body_json(response).await;
        assert_eq!(body["reset"], reset);
        assert!(body["retryAfter"].as_u64().unwrap() >= 89);
    }

    #[tokio::test]
    async fn test_internal_hides_detail() {
        let response = AppError::Internal("connection string leaked".to_string()).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_order_update_failed() {
        let response = AppError::OrderUpdateFailed {
            urls: PhotoUrls {
                front: "https://cdn.test/f.jpg".to_string(),
                rear: "https://cdn.test/r.jpg".to_string(),
            },
            detail: "GraphQL errors".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], ORDER_UPDATE_FAILED);
        assert_eq!(body["urls"]["rear"], "https://cdn.test/r.jpg");
    }

    #[test]
    fn test_lookup_error_mapping() {
        let not_found: AppError =
            LookupError::VehicleData(VehicleDataError::NotFound("AB12CDE".to_string())).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let unconfigured: AppError = LookupError::VehicleData(VehicleDataError::NotConfigured).into();
        assert_eq!(unconfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
