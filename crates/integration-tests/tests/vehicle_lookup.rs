//! Vehicle lookup: cache-aside, normalization and per-client rate limiting.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::atomic::Ordering;

use plateshield_integration_tests::{LOOKUP_LIMIT, TestContext, vehicle_response};
use plateshield_storefront::kv::KvStore;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::Value;

#[tokio::test]
async fn test_lookup_maps_vehicle_and_caches() {
    let ctx = TestContext::new().await;
    ctx.upstream
        .add_vehicle("AB12CDE", vehicle_response("Tesla", "Model 3", 2019));

    let resp = ctx.lookup("AB12CDE", "203.0.113.1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-ratelimit-limit"], "3");
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "2");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["cached"], false);
    assert_eq!(body["vehicle"]["make"], "Tesla");
    assert_eq!(body["vehicle"]["model"], "Model 3");
    assert_eq!(body["vehicle"]["year"], 2019);
    assert_eq!(body["vehicle"]["variant"], "Long Range");
    assert_eq!(body["vehicle"]["bodyStyle"], "Saloon");

    let resp = ctx.lookup("AB12CDE", "203.0.113.1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("x-ratelimit-limit").is_none());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["cached"], true);

    assert_eq!(ctx.upstream.vehicle_calls(), 1);
}

#[tokio::test]
async fn test_spacing_and_case_share_cache_entry() {
    let ctx = TestContext::new().await;
    ctx.upstream
        .add_vehicle("AB12CDE", vehicle_response("BMW", "M3", 2021));

    let first: Value = ctx.lookup("ab12 cde", "203.0.113.2").await.json().await.unwrap();
    let second: Value = ctx.lookup(" AB12CDE ", "203.0.113.3").await.json().await.unwrap();

    assert_eq!(first["vehicle"]["registration"], "AB12CDE");
    assert_eq!(second["cached"], true);
    assert_eq!(ctx.upstream.vehicle_calls(), 1);
}

#[tokio::test]
async fn test_rate_limit_applies_to_misses_only() {
    let ctx = TestContext::new().await;
    for reg in ["AA11AAA", "BB22BBB", "CC33CCC", "DD44DDD"] {
        ctx.upstream
            .add_vehicle(reg, vehicle_response("Audi", "A4", 2018));
    }
    let client = "198.51.100.7";

    for reg in ["AA11AAA", "BB22BBB", "CC33CCC"] {
        assert_eq!(ctx.lookup(reg, client).await.status(), StatusCode::OK);
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let resp = ctx.lookup("DD44DDD", client).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");
    assert!(resp.headers().get("retry-after").is_some());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["reset"].as_i64().unwrap() > now_ms);
    assert!(body["retryAfter"].as_u64().unwrap() >= 1);

    // Cached registrations are still served to a limited client
    let resp = ctx.lookup("AA11AAA", client).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Other clients are unaffected
    let resp = ctx.lookup("DD44DDD", "198.51.100.8").await;
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(ctx.upstream.vehicle_calls(), LOOKUP_LIMIT as usize + 1);
}

#[tokio::test]
async fn test_unknown_registration_is_not_found() {
    let ctx = TestContext::new().await;

    let resp = ctx.lookup("ZZ99ZZZ", "203.0.113.4").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("ZZ99ZZZ"));
}

#[tokio::test]
async fn test_invalid_registration_is_rejected_before_upstream() {
    let ctx = TestContext::new().await;

    for reg in ["", "AB-12", "ABCDEFGHIJKL"] {
        let resp = ctx.lookup(reg, "203.0.113.5").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "registration {reg:?}");
    }

    let resp = ctx
        .client
        .post(ctx.url("/api/vehicle-lookup"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(ctx.upstream.vehicle_calls(), 0);
}

#[tokio::test]
async fn test_unconfigured_api_is_unavailable() {
    let ctx = TestContext::with_config(|config| config.vehicle_data.api_key = None).await;

    let resp = ctx.lookup("AB12CDE", "203.0.113.6").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let status: Value = ctx
        .client
        .get(ctx.url("/api/vehicle-lookup"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "degraded");
    assert_eq!(status["vehicleApi"]["configured"], false);
}

#[tokio::test]
async fn test_upstream_failure_is_unavailable() {
    let ctx = TestContext::new().await;
    ctx.upstream
        .add_vehicle("AB12CDE", vehicle_response("Tesla", "Model 3", 2019));
    ctx.upstream.fail_vehicle_api.store(true, Ordering::SeqCst);

    let resp = ctx.lookup("AB12CDE", "203.0.113.9").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    // Failures are not cached
    ctx.upstream.fail_vehicle_api.store(false, Ordering::SeqCst);
    let body: Value = ctx.lookup("AB12CDE", "203.0.113.9").await.json().await.unwrap();
    assert_eq!(body["cached"], false);
    assert_eq!(body["vehicle"]["make"], "Tesla");
    assert_eq!(ctx.upstream.vehicle_calls(), 2);
}

#[tokio::test]
async fn test_unreachable_store_serves_uncached_and_unlimited() {
    let store = KvStore::from_url(Some(&SecretString::from("redis://127.0.0.1:1"))).unwrap();
    let ctx = TestContext::with_store(|_| {}, store).await;
    ctx.upstream
        .add_vehicle("AB12CDE", vehicle_response("Tesla", "Model 3", 2019));

    let attempts = LOOKUP_LIMIT as usize + 2;
    for _ in 0..attempts {
        let resp = ctx.lookup("AB12CDE", "203.0.113.10").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("x-ratelimit-limit").is_none());
        assert!(resp.headers().get("x-ratelimit-remaining").is_none());
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["cached"], false);
        assert_eq!(body["vehicle"]["make"], "Tesla");
    }

    assert_eq!(ctx.upstream.vehicle_calls(), attempts);
}

#[tokio::test]
async fn test_status_report() {
    let ctx = TestContext::new().await;

    let resp = ctx.client.get(ctx.url("/api/vehicle-lookup")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["status"], "ok");
    assert_eq!(status["vehicleApi"]["package"], "VehicleDetails");
    assert_eq!(status["cache"]["backend"], "memory");
    assert_eq!(status["rateLimit"]["limit"], 3);
    assert_eq!(status["rateLimit"]["windowSeconds"], 3600);
    assert!(!status.to_string().contains("9b2e4f6a8c0d1e3f"));
}

#[tokio::test]
async fn test_health_and_headers() {
    let ctx = TestContext::new().await;

    let resp = ctx.client.get(ctx.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("x-request-id").is_some());
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");

    let resp = ctx.client.get(ctx.url("/health/ready")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
