//! Integration tests for Plateshield.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p plateshield-integration-tests
//! ```
//!
//! Each test starts the storefront in-process on an ephemeral port, backed
//! by the in-memory key-value store. The vehicle data API, Cloudinary, the
//! Shopify Admin API and Resend are replaced by a single fake upstream
//! server that records every call, so no credentials or network access are
//! needed.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use plateshield_core::{
    Email, OrderId, PhotoToken, PhotoTokenData, VehicleAttributes,
};
use plateshield_storefront::{
    app,
    config::{
        CloudinaryConfig, EmailConfig, LookupConfig, ShopifyAdminConfig, StorefrontConfig,
        VehicleDataConfig,
    },
    kv::KvStore,
    services::images::MAX_UPLOAD_BODY_BYTES,
    shopify::webhook::{self, HMAC_HEADER, TOPIC_HEADER, WEBHOOK_ID_HEADER},
    state::AppState,
};
use secrecy::SecretString;
use serde_json::{Value, json};

pub const WEBHOOK_SECRET: &str = "7f3a9c1e5b2d8f4a6c0e9b3d7a1f5c8e";
pub const OPERATOR_EMAIL: &str = "ops@plateshield.test";
pub const PUBLIC_BASE_URL: &str = "https://plateshield.test";
pub const LOOKUP_LIMIT: u32 = 3;

// =============================================================================
// Fake upstream services
// =============================================================================

/// Everything the fake upstream has been asked to do, plus switches that
/// make it fail.
#[derive(Default)]
pub struct Upstream {
    /// Vehicle API responses keyed by registration.
    pub vehicles: Mutex<HashMap<String, Value>>,
    pub vehicle_calls: AtomicUsize,
    pub fail_vehicle_api: AtomicBool,
    /// Form fields of each Cloudinary upload.
    pub uploads: Mutex<Vec<HashMap<String, String>>>,
    pub fail_uploads: AtomicBool,
    /// Fail only rear photo uploads.
    pub fail_rear_uploads: AtomicBool,
    /// Current custom attributes of the single fake order.
    pub order_attributes: Mutex<Vec<Value>>,
    /// `input` variables of each `orderUpdate` mutation.
    pub order_updates: Mutex<Vec<Value>>,
    pub fail_order_update: AtomicBool,
    /// Request bodies sent to Resend.
    pub emails: Mutex<Vec<Value>>,
}

impl Upstream {
    /// Serve a successful lookup for `registration`.
    pub fn add_vehicle(&self, registration: &str, body: Value) {
        self.vehicles
            .lock()
            .unwrap()
            .insert(registration.to_string(), body);
    }

    pub fn vehicle_calls(&self) -> usize {
        self.vehicle_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<HashMap<String, String>> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn order_updates(&self) -> Vec<Value> {
        self.order_updates.lock().unwrap().clone()
    }

    pub fn emails(&self) -> Vec<Value> {
        self.emails.lock().unwrap().clone()
    }
}

/// A vehicle API response with both the DVLA and curated blocks.
pub fn vehicle_response(make: &str, model: &str, year: i32) -> Value {
    json!({
        "ResponseInformation": {
            "StatusCode": 0,
            "StatusMessage": "Success",
            "IsSuccessStatusCode": true
        },
        "Results": {
            "VehicleDetails": {
                "VehicleIdentification": {
                    "Vin": "5YJ3E7EB2KF000001",
                    "DvlaMake": make.to_uppercase(),
                    "DvlaModel": model.to_uppercase(),
                    "DvlaBodyType": "SALOON",
                    "DvlaFuelType": "ELECTRICITY",
                    "YearOfManufacture": year,
                    "DateFirstRegistered": format!("{year}-03-01T00:00:00")
                }
            },
            "ModelDetails": {
                "ModelIdentification": {
                    "Make": make,
                    "Range": model,
                    "Model": model,
                    "ModelVariant": "Long Range"
                },
                "BodyDetails": { "BodyStyle": "Saloon" },
                "Powertrain": { "FuelType": "Electric" }
            }
        }
    })
}

async fn fake_vehicle_api(
    State(upstream): State<Arc<Upstream>>,
    Path(_package): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    upstream.vehicle_calls.fetch_add(1, Ordering::SeqCst);
    if upstream.fail_vehicle_api.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "Message": "Upstream provider unavailable" })),
        );
    }

    let registration = params.get("key_VRM").cloned().unwrap_or_default();
    let body = upstream.vehicles.lock().unwrap().get(&registration).cloned();

    (
        StatusCode::OK,
        Json(body.unwrap_or_else(|| {
            json!({
                "ResponseInformation": {
                    "StatusCode": 25,
                    "StatusMessage": "No Results Found",
                    "IsSuccessStatusCode": false
                },
                "Results": null
            })
        })),
    )
}

async fn fake_cloudinary(
    State(upstream): State<Arc<Upstream>>,
    Path(_cloud): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let public_id = form.get("public_id").cloned().unwrap_or_default();
    upstream.uploads.lock().unwrap().push(form);

    let fail_rear =
        upstream.fail_rear_uploads.load(Ordering::SeqCst) && public_id.contains("-rear-");
    if upstream.fail_uploads.load(Ordering::SeqCst) || fail_rear {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": "Upload service unavailable" } })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "secure_url": format!("https://res.cloudinary.test/vehicle-photos/{public_id}.jpg"),
            "public_id": format!("vehicle-photos/{public_id}"),
        })),
    )
}

async fn fake_shopify(
    State(upstream): State<Arc<Upstream>>,
    Path(_version): Path<String>,
    Json(request): Json<Value>,
) -> Json<Value> {
    let query = request["query"].as_str().unwrap_or_default();

    if query.contains("orderUpdate") {
        let input = request["variables"]["input"].clone();
        upstream.order_updates.lock().unwrap().push(input.clone());

        if upstream.fail_order_update.load(Ordering::SeqCst) {
            return Json(json!({
                "data": {
                    "orderUpdate": {
                        "order": null,
                        "userErrors": [{ "field": ["id"], "message": "Order is archived" }]
                    }
                }
            }));
        }

        if let Some(attributes) = input["customAttributes"].as_array() {
            upstream
                .order_attributes
                .lock()
                .unwrap()
                .clone_from(attributes);
        }
        return Json(json!({
            "data": { "orderUpdate": { "order": { "id": input["id"] }, "userErrors": [] } }
        }));
    }

    let attributes = upstream.order_attributes.lock().unwrap().clone();
    Json(json!({
        "data": {
            "order": {
                "id": request["variables"]["id"],
                "customAttributes": attributes
            }
        }
    }))
}

async fn fake_resend(
    State(upstream): State<Arc<Upstream>>,
    Json(email): Json<Value>,
) -> Json<Value> {
    let mut emails = upstream.emails.lock().unwrap();
    emails.push(email);
    Json(json!({ "id": format!("email_{}", emails.len()) }))
}

async fn spawn_upstream(upstream: Arc<Upstream>) -> String {
    let router = Router::new()
        .route("/vehicle/{package}", get(fake_vehicle_api))
        .route("/cloudinary/{cloud}/image/upload", post(fake_cloudinary))
        .route("/shopify/admin/api/{version}/graphql.json", post(fake_shopify))
        .route("/resend/emails", post(fake_resend))
        .layer(DefaultBodyLimit::disable())
        .with_state(upstream);

    serve(router).await
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// Storefront under test
// =============================================================================

/// Storefront configuration pointing every client at the fake upstream.
pub fn test_config(upstream_url: &str) -> StorefrontConfig {
    StorefrontConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: PUBLIC_BASE_URL.to_string(),
        redis_url: None,
        vehicle_data: VehicleDataConfig {
            api_key: Some(SecretString::from("9b2e4f6a8c0d1e3f")),
            package_name: "VehicleDetails".to_string(),
            base_url: format!("{upstream_url}/vehicle"),
        },
        lookup: LookupConfig {
            rate_limit: LOOKUP_LIMIT,
            rate_window: Duration::from_secs(3600),
            cache_ttl: Duration::from_secs(30 * 86_400),
        },
        photo_token_ttl: Duration::from_secs(7 * 86_400),
        max_upload_bytes: MAX_UPLOAD_BODY_BYTES,
        shopify: ShopifyAdminConfig {
            store: "plateshield-test.myshopify.com".to_string(),
            api_version: "2026-01".to_string(),
            base_url: format!("{upstream_url}/shopify"),
            access_token: SecretString::from("shpat_4e8a1c9f2b7d3e6a"),
            webhook_secret: Some(SecretString::from(WEBHOOK_SECRET)),
        },
        cloudinary: CloudinaryConfig {
            cloud_name: "plateshield".to_string(),
            api_key: "418273645".to_string(),
            api_secret: SecretString::from("c7Kd93mQx2Lp"),
            folder: "vehicle-photos".to_string(),
            base_url: format!("{upstream_url}/cloudinary"),
        },
        email: EmailConfig {
            api_key: SecretString::from("re_8Fh2kQ9zLm3x"),
            from_address: "Plateshield <orders@plateshield.test>".to_string(),
            operator_address: Some(OPERATOR_EMAIL.to_string()),
            base_url: format!("{upstream_url}/resend"),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// A running storefront wired to a fake upstream.
pub struct TestContext {
    pub client: reqwest::Client,
    pub base_url: String,
    pub state: AppState,
    pub upstream: Arc<Upstream>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Start a storefront after adjusting the default test configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut StorefrontConfig)) -> Self {
        Self::with_store(adjust, KvStore::in_memory()).await
    }

    /// Start a storefront backed by the given key-value store.
    pub async fn with_store(adjust: impl FnOnce(&mut StorefrontConfig), store: KvStore) -> Self {
        let upstream = Arc::new(Upstream::default());
        let upstream_url = spawn_upstream(Arc::clone(&upstream)).await;

        let mut config = test_config(&upstream_url);
        adjust(&mut config);

        let state = AppState::with_store(config, store).unwrap();
        let base_url = serve(app(state.clone())).await;

        Self {
            client: reqwest::Client::new(),
            base_url,
            state,
            upstream,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST a registration lookup as the given client address.
    pub async fn lookup(&self, registration: &str, client_ip: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/vehicle-lookup"))
            .header("x-forwarded-for", client_ip)
            .json(&json!({ "registration": registration }))
            .send()
            .await
            .unwrap()
    }

    /// Deliver a signed `orders/create` webhook.
    pub async fn deliver_order(&self, order: &Value, webhook_id: &str) -> reqwest::Response {
        let body = serde_json::to_vec(order).unwrap();
        let signature = webhook::sign(WEBHOOK_SECRET.as_bytes(), &body).unwrap();

        self.client
            .post(self.url("/api/webhooks/orders"))
            .header("content-type", "application/json")
            .header(HMAC_HEADER, signature)
            .header(TOPIC_HEADER, "orders/create")
            .header(WEBHOOK_ID_HEADER, webhook_id)
            .body(body)
            .send()
            .await
            .unwrap()
    }

    /// Issue a token directly through the token service.
    pub async fn issue_token(&self, order_id: u64) -> PhotoToken {
        self.state
            .photo_tokens()
            .issue(&token_data(order_id))
            .await
            .unwrap()
    }

    pub async fn upload(&self, token: &str, front: &str, rear: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/upload-photos"))
            .json(&json!({ "token": token, "frontImage": front, "rearImage": rear }))
            .send()
            .await
            .unwrap()
    }

    /// Wait for background emails to reach the fake Resend API.
    pub async fn wait_for_emails(&self, count: usize) -> Vec<Value> {
        for _ in 0..50 {
            let emails = self.upstream.emails();
            if emails.len() >= count {
                return emails;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.upstream.emails()
    }
}

/// Token data for an order placed for a 2019 Tesla Model 3.
pub fn token_data(order_id: u64) -> PhotoTokenData {
    PhotoTokenData {
        shopify_order_id: OrderId::new(order_id),
        shopify_order_name: format!("#{order_id}"),
        email: Email::parse("driver@example.com").unwrap(),
        vehicle_data: VehicleAttributes {
            registration: "AB12CDE".to_string(),
            make: "Tesla".to_string(),
            model: Some("Model 3".to_string()),
            year: Some(2019),
            variant: None,
        },
        created_at: Utc::now(),
    }
}

/// A tiny JPEG as a `data:` URI.
pub fn jpeg_data_uri() -> String {
    jpeg_data_uri_of_size(256)
}

/// A JPEG of `size` decoded bytes as a `data:` URI.
pub fn jpeg_data_uri_of_size(size: usize) -> String {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    bytes.extend_from_slice(b"JFIF\0");
    bytes.resize(size, 0);
    format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}

/// A tiny PNG, base64 without a `data:` prefix.
pub fn png_base64() -> String {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(128, 0);
    STANDARD.encode(bytes)
}
