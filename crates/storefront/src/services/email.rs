//! Transactional email via the Resend API.
//!
//! Messages are rendered from Askama templates in both HTML and plain text.

use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use plateshield_core::{Email, VehicleAttributes};

use crate::config::EmailConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTML template for the photo request sent to the customer.
#[derive(Template)]
#[template(path = "email/photo_request.html")]
struct PhotoRequestEmailHtml<'a> {
    order_name: &'a str,
    summary: &'a str,
    details: &'a [(&'static str, String)],
    upload_url: &'a str,
    valid_days: u64,
}

/// Plain text template for the photo request sent to the customer.
#[derive(Template)]
#[template(path = "email/photo_request.txt")]
struct PhotoRequestEmailText<'a> {
    order_name: &'a str,
    summary: &'a str,
    details: &'a [(&'static str, String)],
    upload_url: &'a str,
    valid_days: u64,
}

/// HTML template for the operator notification.
#[derive(Template)]
#[template(path = "email/photos_received.html")]
struct PhotosReceivedEmailHtml<'a> {
    order_name: &'a str,
    details: &'a [(&'static str, String)],
    front_url: &'a str,
    rear_url: &'a str,
}

/// Plain text template for the operator notification.
#[derive(Template)]
#[template(path = "email/photos_received.txt")]
struct PhotosReceivedEmailText<'a> {
    order_name: &'a str,
    details: &'a [(&'static str, String)],
    front_url: &'a str,
    rear_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Invalid API key format.
    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    inner: Arc<EmailServiceInner>,
}

struct EmailServiceInner {
    client: reqwest::Client,
    endpoint: String,
    from_address: String,
    operator_address: Option<String>,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| EmailError::InvalidApiKey(e.to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(EmailServiceInner {
                client,
                endpoint: format!("{}/emails", config.base_url.trim_end_matches('/')),
                from_address: config.from_address.clone(),
                operator_address: config.operator_address.clone(),
            }),
        })
    }

    /// Ask a customer to photograph their vehicle.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip(self, to, vehicle, upload_url))]
    pub async fn send_photo_request(
        &self,
        to: &Email,
        order_name: &str,
        vehicle: &VehicleAttributes,
        upload_url: &str,
        valid_days: u64,
    ) -> Result<(), EmailError> {
        let summary = vehicle.summary();
        let details = vehicle.labelled();

        let html = PhotoRequestEmailHtml {
            order_name,
            summary: &summary,
            details: &details,
            upload_url,
            valid_days,
        }
        .render()?;
        let text = PhotoRequestEmailText {
            order_name,
            summary: &summary,
            details: &details,
            upload_url,
            valid_days,
        }
        .render()?;

        let subject = format!("Order {order_name}: photos of your vehicle");
        self.send(to.as_str(), &subject, &text, &html).await
    }

    /// Tell the operator a customer has uploaded photos.
    ///
    /// Returns `false` without sending if no operator address is configured.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip(self, vehicle, front_url, rear_url))]
    pub async fn send_photos_received(
        &self,
        order_name: &str,
        vehicle: &VehicleAttributes,
        front_url: &str,
        rear_url: &str,
    ) -> Result<bool, EmailError> {
        let Some(operator) = self.inner.operator_address.as_deref() else {
            return Ok(false);
        };
        let details = vehicle.labelled();

        let html = PhotosReceivedEmailHtml {
            order_name,
            details: &details,
            front_url,
            rear_url,
        }
        .render()?;
        let text = PhotosReceivedEmailText {
            order_name,
            details: &details,
            front_url,
            rear_url,
        }
        .render()?;

        let subject = format!("Photos received for {order_name} ({})", vehicle.registration);
        self.send(operator, &subject, &text, &html).await?;
        Ok(true)
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<(), EmailError> {
        let request = SendEmailRequest {
            from: &self.inner.from_address,
            to: [to],
            subject,
            html,
            text,
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .json(&request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        info!(subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn vehicle() -> VehicleAttributes {
        VehicleAttributes {
            registration: "AB12CDE".to_string(),
            make: "Tesla".to_string(),
            model: Some("Model 3".to_string()),
            year: Some(2019),
            variant: None,
        }
    }

    #[test]
    fn test_photo_request_text() {
        let vehicle = vehicle();
        let details = vehicle.labelled();
        let text = PhotoRequestEmailText {
            order_name: "#1001",
            summary: &vehicle.summary(),
            details: &details,
            upload_url: "https://plateshield.test/upload-photos?token=abc",
            valid_days: 7,
        }
        .render()
        .unwrap();

        assert!(text.contains("#1001"));
        assert!(text.contains("2019 Tesla Model 3 (AB12CDE)"));
        assert!(text.contains("https://plateshield.test/upload-photos?token=abc"));
        assert!(text.contains("7 days"));
    }

    #[test]
    fn test_html_escapes_values() {
        let mut vehicle = vehicle();
        vehicle.make = "<b>Tesla</b>".to_string();
        let details = vehicle.labelled();
        let html = PhotosReceivedEmailHtml {
            order_name: "#1001",
            details: &details,
            front_url: "https://cdn.test/front.jpg",
            rear_url: "https://cdn.test/rear.jpg",
        }
        .render()
        .unwrap();

        assert!(!html.contains("<b>Tesla</b>"));
        assert!(html.contains("https://cdn.test/front.jpg"));
    }
}
