//! Cloudinary client for storing vehicle photos.
//!
//! Uses signed uploads: the request parameters (minus `file` and `api_key`)
//! are sorted, joined as a query string, suffixed with the API secret and
//! hashed with SHA-256.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::CloudinaryConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when uploading to Cloudinary.
#[derive(Debug, Error)]
pub enum CloudinaryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A stored image.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedImage {
    pub secure_url: String,
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Cloudinary upload client.
#[derive(Clone)]
pub struct CloudinaryClient {
    inner: Arc<CloudinaryClientInner>,
}

struct CloudinaryClientInner {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: SecretString,
    folder: String,
}

impl CloudinaryClient {
    /// Create a new Cloudinary client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CloudinaryConfig) -> Result<Self, CloudinaryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(CloudinaryClientInner {
                client,
                upload_url: format!(
                    "{}/{}/image/upload",
                    config.base_url.trim_end_matches('/'),
                    config.cloud_name
                ),
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
                folder: config.folder.clone(),
            }),
        })
    }

    /// Upload an image given as a `data:` URI.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Cloudinary rejects the upload.
    #[instrument(skip(self, data_uri), fields(bytes = data_uri.len()))]
    pub async fn upload_image(
        &self,
        data_uri: &str,
        public_id: &str,
    ) -> Result<UploadedImage, CloudinaryError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signed = [
            ("folder", self.inner.folder.as_str()),
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
        ];
        let signature = sign_params(&signed, &self.inner.api_secret);

        let mut form: Vec<(&str, &str)> = signed.to_vec();
        form.extend([
            ("file", data_uri),
            ("api_key", self.inner.api_key.as_str()),
            ("signature", signature.as_str()),
            ("signature_algorithm", "sha256"),
        ]);

        let response = self
            .inner
            .client
            .post(&self.inner.upload_url)
            .form(&form)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(CloudinaryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let uploaded: UploadedImage = response
            .json()
            .await
            .map_err(|e| CloudinaryError::Parse(e.to_string()))?;

        info!(public_id = %uploaded.public_id, "Image uploaded");
        Ok(uploaded)
    }
}

/// Sign upload parameters: sorted `key=value` pairs joined with `&`, then
/// the API secret, hashed with SHA-256.
fn sign_params(params: &[(&str, &str)], api_secret: &SecretString) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by_key(|(k, _)| *k);

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.expose_secret().as_bytes());
    hex::encode(hasher.finalize())
}
