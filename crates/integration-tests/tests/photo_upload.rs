//! Photo upload: token redemption, CDN storage and order write-back.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::atomic::Ordering;

use plateshield_integration_tests::{
    OPERATOR_EMAIL, TestContext, jpeg_data_uri, jpeg_data_uri_of_size, png_base64,
};
use plateshield_storefront::services::images::MAX_IMAGE_BYTES;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
async fn test_upload_attaches_photos_to_order() {
    let ctx = TestContext::new().await;
    ctx.upstream
        .order_attributes
        .lock()
        .unwrap()
        .extend([
            json!({ "key": "registration", "value": "AB12CDE" }),
            json!({ "key": "gift_note", "value": null }),
        ]);
    let token = ctx.issue_token(1001).await;

    let resp = ctx.upload(token.as_str(), &jpeg_data_uri(), &png_base64()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    let front = body["urls"]["front"].as_str().unwrap();
    let rear = body["urls"]["rear"].as_str().unwrap();
    assert!(front.contains("order-1001-front"));
    assert!(rear.contains("order-1001-rear"));

    let uploads = ctx.upstream.uploads();
    assert_eq!(uploads.len(), 2);
    for upload in &uploads {
        assert_eq!(upload["folder"], "vehicle-photos");
        assert_eq!(upload["signature_algorithm"], "sha256");
        assert!(upload["file"].starts_with("data:image/"));
    }

    let updates = ctx.upstream.order_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["id"], "gid://shopify/Order/1001");
    let attributes = updates[0]["customAttributes"].as_array().unwrap();
    let value_of = |key: &str| {
        attributes
            .iter()
            .find(|a| a["key"] == key)
            .and_then(|a| a["value"].as_str())
            .map(str::to_string)
    };
    assert_eq!(value_of("registration").as_deref(), Some("AB12CDE"));
    assert_eq!(value_of("gift_note").as_deref(), Some(""));
    assert_eq!(value_of("Front Photo").as_deref(), Some(front));
    assert_eq!(value_of("Rear Photo").as_deref(), Some(rear));
    assert!(value_of("Photos Uploaded At").is_some());

    let emails = ctx.wait_for_emails(1).await;
    assert_eq!(emails[0]["to"][0], OPERATOR_EMAIL);

    // Single use
    let resp = ctx.upload(token.as_str(), &jpeg_data_uri(), &png_base64()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.upstream.uploads().len(), 2);
}

#[tokio::test]
async fn test_cdn_failure_restores_token() {
    let ctx = TestContext::new().await;
    ctx.upstream.fail_uploads.store(true, Ordering::SeqCst);
    let token = ctx.issue_token(1002).await;

    let resp = ctx.upload(token.as_str(), &jpeg_data_uri(), &jpeg_data_uri()).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert!(ctx.upstream.order_updates().is_empty());

    let data = ctx.state.photo_tokens().validate(&token).await.unwrap();
    assert_eq!(data.unwrap().shopify_order_name, "#1002");

    ctx.upstream.fail_uploads.store(false, Ordering::SeqCst);
    let resp = ctx.upload(token.as_str(), &jpeg_data_uri(), &jpeg_data_uri()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_partial_cdn_failure_restores_token() {
    let ctx = TestContext::new().await;
    ctx.upstream.fail_rear_uploads.store(true, Ordering::SeqCst);
    let token = ctx.issue_token(1006).await;

    let resp = ctx.upload(token.as_str(), &jpeg_data_uri(), &jpeg_data_uri()).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let uploads = ctx.upstream.uploads();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().any(|u| u["public_id"].contains("order-1006-front")));
    assert!(ctx.upstream.order_updates().is_empty());
    assert!(ctx.state.photo_tokens().validate(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_two_max_size_images_fit_body_limit() {
    let ctx = TestContext::new().await;
    let token = ctx.issue_token(1007).await;
    let image = jpeg_data_uri_of_size(MAX_IMAGE_BYTES);

    let resp = ctx.upload(token.as_str(), &image, &image).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(ctx.upstream.order_updates().len(), 1);

    // One byte over the image cap is a validation error, not a body limit rejection
    let token = ctx.issue_token(1008).await;
    let oversized = jpeg_data_uri_of_size(MAX_IMAGE_BYTES + 1);
    let resp = ctx.upload(token.as_str(), &image, &oversized).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_update_failure_reports_urls() {
    let ctx = TestContext::new().await;
    ctx.upstream.fail_order_update.store(true, Ordering::SeqCst);
    let token = ctx.issue_token(1003).await;

    let resp = ctx.upload(token.as_str(), &jpeg_data_uri(), &jpeg_data_uri()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ORDER_UPDATE_FAILED");
    assert!(body["urls"]["front"].as_str().unwrap().contains("order-1003-front"));
    assert!(body["urls"]["rear"].as_str().unwrap().contains("order-1003-rear"));

    // Photos are stored, so the link is spent
    assert!(ctx.state.photo_tokens().validate(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_image_keeps_token() {
    let ctx = TestContext::new().await;
    let token = ctx.issue_token(1004).await;

    let resp = ctx.upload(token.as_str(), &jpeg_data_uri(), "not base64!").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Rear"));

    // Valid base64, but a GIF
    let gif = "data:image/gif;base64,R0lGODlhAQABAAAAACw=";
    let resp = ctx.upload(token.as_str(), gif, &jpeg_data_uri()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = ctx.upload(token.as_str(), "", &jpeg_data_uri()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(ctx.upstream.uploads().is_empty());
    assert!(ctx.state.photo_tokens().validate(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let ctx = TestContext::new().await;

    let resp = ctx
        .upload(&"cd".repeat(32), &jpeg_data_uri(), &jpeg_data_uri())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(ctx.upstream.uploads().is_empty());
}

#[tokio::test]
async fn test_concurrent_uploads_redeem_once() {
    let ctx = TestContext::new().await;
    let token = ctx.issue_token(1005).await;
    let front = jpeg_data_uri();
    let rear = jpeg_data_uri();

    let (a, b) = tokio::join!(
        ctx.upload(token.as_str(), &front, &rear),
        ctx.upload(token.as_str(), &front, &rear),
    );
    let mut statuses = [a.status(), b.status()];
    statuses.sort();

    assert_eq!(statuses, [StatusCode::OK, StatusCode::NOT_FOUND]);
    assert_eq!(ctx.upstream.order_updates().len(), 1);
}
