//! Shopify webhook endpoints.
//!
//! Shopify expects an answer within 5 seconds and retries anything that is
//! not 2xx, sometimes delivering the same event more than once. Deliveries
//! are deduplicated on `X-Shopify-Webhook-Id` and the follow-up email is
//! sent in the background.

use std::time::Duration;

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{error, field, info, instrument, warn};

use plateshield_core::{Email, PhotoToken, PhotoTokenData};

use crate::error::{AppError, Result};
use crate::shopify::webhook::{
    self, HMAC_HEADER, OrderWebhook, TOPIC_HEADER, WEBHOOK_ID_HEADER, WebhookError,
};
use crate::state::AppState;

/// How long a delivery ID is remembered. Shopify stops retrying well
/// within this window.
const DELIVERY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    /// A photo token was issued and the customer is being emailed.
    Accepted,
    /// The order has no vehicle attributes or no usable email.
    Ignored,
    /// This delivery was already processed.
    Duplicate,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: WebhookStatus,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn delivery_key(webhook_id: &str) -> String {
    format!("webhook:orders:{webhook_id}")
}

/// POST /api/webhooks/orders - Shopify `orders/create` webhook.
#[instrument(skip_all, fields(topic = field::Empty, webhook_id = field::Empty))]
pub async fn order_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let secret = state
        .config()
        .shopify
        .webhook_secret
        .as_ref()
        .filter(|s| !s.expose_secret().is_empty())
        .ok_or(WebhookError::SecretNotConfigured)?;
    let signature = header(&headers, HMAC_HEADER).ok_or(WebhookError::MissingSignature)?;
    webhook::verify(secret.expose_secret().as_bytes(), &body, signature)?;

    let span = tracing::Span::current();
    if let Some(topic) = header(&headers, TOPIC_HEADER) {
        span.record("topic", topic);
    }
    let webhook_id = header(&headers, WEBHOOK_ID_HEADER).map(str::to_string);
    if let Some(id) = &webhook_id {
        span.record("webhook_id", id.as_str());
    }

    let order: OrderWebhook = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid order payload: {e}")))?;

    if let Some(id) = &webhook_id
        && !claim_delivery(&state, id).await
    {
        info!(order = %order.name, "Duplicate webhook delivery");
        return Ok(Json(WebhookResponse {
            status: WebhookStatus::Duplicate,
        }));
    }

    match process_order(&state, &order).await {
        Ok(status) => Ok(Json(WebhookResponse { status })),
        Err(e) => {
            // Let Shopify's retry through
            if let Some(id) = &webhook_id {
                release_delivery(&state, id).await;
            }
            Err(e)
        }
    }
}

/// Record a delivery ID. Returns `false` if it was already recorded.
///
/// A store failure is logged and treated as a first delivery.
async fn claim_delivery(state: &AppState, webhook_id: &str) -> bool {
    match state
        .kv()
        .set_if_absent(&delivery_key(webhook_id), "1", DELIVERY_TTL)
        .await
    {
        Ok(claimed) => claimed,
        Err(e) => {
            warn!(error = %e, "Webhook deduplication unavailable");
            true
        }
    }
}

async fn release_delivery(state: &AppState, webhook_id: &str) {
    if let Err(e) = state.kv().delete(&delivery_key(webhook_id)).await {
        warn!(error = %e, "Failed to release webhook delivery marker");
    }
}

async fn process_order(state: &AppState, order: &OrderWebhook) -> Result<WebhookStatus> {
    let Some((source, vehicle)) = order.vehicle_attributes() else {
        info!(order = %order.name, "Order has no vehicle attributes");
        return Ok(WebhookStatus::Ignored);
    };

    let Some(email) = order.customer_email().and_then(|e| Email::parse(e).ok()) else {
        warn!(order = %order.name, "Order has vehicle attributes but no usable email");
        return Ok(WebhookStatus::Ignored);
    };

    info!(
        order = %order.name,
        source = source.as_str(),
        registration = %vehicle.registration,
        "Vehicle attributes found on order"
    );

    let data = PhotoTokenData {
        shopify_order_id: order.id,
        shopify_order_name: order.name.clone(),
        email,
        vehicle_data: vehicle,
        created_at: Utc::now(),
    };
    let token = state.photo_tokens().issue(&data).await?;

    send_photo_request(state, &token, data);

    Ok(WebhookStatus::Accepted)
}

/// Email the upload link without holding up the webhook response.
fn send_photo_request(state: &AppState, token: &PhotoToken, data: PhotoTokenData) {
    let email = state.email().clone();
    let upload_url = state.config().photo_upload_url(token.as_str());
    let valid_days = state.photo_tokens().ttl().as_secs() / (24 * 60 * 60);

    tokio::spawn(async move {
        let order_name = data.shopify_order_name.as_str();
        match email
            .send_photo_request(
                &data.email,
                order_name,
                &data.vehicle_data,
                &upload_url,
                valid_days,
            )
            .await
        {
            Ok(()) => info!(order = %order_name, "Photo request email sent"),
            Err(e) => error!(
                order = %order_name,
                error = %e,
                "Failed to send photo request email; reissue with `ps-cli token issue`"
            ),
        }
    });
}
