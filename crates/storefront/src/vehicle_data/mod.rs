//! UK vehicle data API client.
//!
//! Resolves a registration mark to make, model and year via a single
//! `GET {base_url}/{package}` call. The API key travels as a query parameter,
//! so request URLs are never logged.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use plateshield_core::{Registration, VehicleData};

use crate::config::{VehicleDataConfig, has_secret};

use self::types::LookupResponse;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when looking up a vehicle.
#[derive(Debug, Error)]
pub enum VehicleDataError {
    /// No API key configured.
    #[error("Vehicle data API is not configured")]
    NotConfigured,

    /// HTTP request failed (connection, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API answered with a non-success HTTP status.
    #[error("Vehicle data API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The API has no record of the registration.
    #[error("No vehicle found for {0}")]
    NotFound(String),

    /// The response body did not have the expected shape.
    #[error("Unexpected vehicle data response: {0}")]
    Parse(String),
}

/// Client for the vehicle data API.
#[derive(Clone)]
pub struct VehicleDataClient {
    inner: Arc<VehicleDataClientInner>,
}

struct VehicleDataClientInner {
    client: reqwest::Client,
    base_url: String,
    package_name: String,
    api_key: Option<SecretString>,
}

impl VehicleDataClient {
    /// Create a new vehicle data client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &VehicleDataConfig) -> Result<Self, VehicleDataError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(VehicleDataClientInner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                package_name: config.package_name.clone(),
                api_key: config.api_key.clone(),
            }),
        })
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        has_secret(self.inner.api_key.as_ref())
    }

    /// Data package requested from the API.
    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.inner.package_name
    }

    /// Look up a vehicle by registration.
    ///
    /// # Errors
    ///
    /// - `NotConfigured` if no API key is set
    /// - `NotFound` if the API has no data for the registration
    /// - `Http` / `Status` if the API is unreachable or failing
    /// - `Parse` if the response cannot be understood
    #[instrument(skip(self), fields(registration = %registration))]
    pub async fn lookup(&self, registration: &Registration) -> Result<VehicleData, VehicleDataError> {
        let api_key = self
            .inner
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().is_empty())
            .ok_or(VehicleDataError::NotConfigured)?;

        let url = self.lookup_url(api_key, registration)?;
        let response = self.inner.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(VehicleDataError::NotFound(registration.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, "Vehicle data API request failed");
            return Err(VehicleDataError::Status {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| VehicleDataError::Parse(e.to_string()))?;

        if !body.is_success() {
            debug!(
                status_message = body.status_message(),
                "Vehicle data API reported no result"
            );
            return Err(VehicleDataError::NotFound(registration.to_string()));
        }

        let current_year = chrono::Utc::now().year();
        body.into_vehicle_data(registration.clone(), current_year)
            .ok_or_else(|| VehicleDataError::NotFound(registration.to_string()))
    }

    fn lookup_url(
        &self,
        api_key: &SecretString,
        registration: &Registration,
    ) -> Result<Url, VehicleDataError> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.inner.base_url, self.inner.package_name
        ))
        .map_err(|e| VehicleDataError::Parse(format!("invalid base URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("v", "2")
            .append_pair("api_nullitems", "1")
            .append_pair("auth_apikey", api_key.expose_secret())
            .append_pair("key_VRM", registration.as_str());

        Ok(url)
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
