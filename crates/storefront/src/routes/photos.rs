//! Photo upload endpoints used by the post-purchase capture page.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use plateshield_core::{PhotoToken, PhotoTokenData};

use crate::error::{AppError, Result, image_error};
use crate::services::{ImagePayload, PhotoUrls};
use crate::state::AppState;

const TOKEN_NOT_FOUND: &str = "This upload link is invalid, expired or already used";

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /api/validate-token - Look up a photo token without consuming it.
#[instrument(skip_all)]
pub async fn validate_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<PhotoTokenData>> {
    let token = PhotoToken::parse(query.token.as_deref().unwrap_or_default())?;

    state
        .photo_tokens()
        .validate(&token)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(TOKEN_NOT_FOUND.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub front_image: Option<String>,
    #[serde(default)]
    pub rear_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub urls: PhotoUrls,
}

/// POST /api/upload-photos - Redeem a token with front and rear photos.
///
/// The payload is fully validated before the token is touched, so a bad
/// image never costs the customer their link.
#[instrument(skip_all)]
pub async fn upload_photos(
    State(state): State<AppState>,
    body: std::result::Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>> {
    let Json(request) = body?;

    let token = PhotoToken::parse(request.token.as_deref().unwrap_or_default())?;
    let front = ImagePayload::parse(request.front_image.as_deref().unwrap_or_default())
        .map_err(|e| image_error("Front", &e))?;
    let rear = ImagePayload::parse(request.rear_image.as_deref().unwrap_or_default())
        .map_err(|e| image_error("Rear", &e))?;

    let outcome = state.photo_upload().upload(&token, &front, &rear).await?;

    Ok(Json(UploadResponse {
        success: true,
        urls: outcome.urls,
    }))
}
