//! Webhook helpers.
//!
//! # Environment Variables
//!
//! - `SHOPIFY_WEBHOOK_SECRET` - Webhook signing secret

use std::path::Path;

use plateshield_storefront::shopify::webhook::{self, HMAC_HEADER, WebhookError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookCommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Failed to read body: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to sign body: {0}")]
    Sign(#[from] WebhookError),
}

/// Print the signature header for a request body, exactly as Shopify would
/// send it.
pub fn sign(file: &Path) -> Result<(), WebhookCommandError> {
    dotenvy::dotenv().ok();

    let secret = std::env::var("SHOPIFY_WEBHOOK_SECRET")
        .map_err(|_| WebhookCommandError::MissingEnvVar("SHOPIFY_WEBHOOK_SECRET"))?;
    let body = std::fs::read(file)?;
    let signature = webhook::sign(secret.as_bytes(), &body)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{HMAC_HEADER}: {signature}");
    }
    Ok(())
}
