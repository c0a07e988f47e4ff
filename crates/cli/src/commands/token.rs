//! Photo token commands.
//!
//! Used to re-send a photo request when the webhook email went astray, or to
//! kill a link that was shared by mistake.

use chrono::Utc;
use clap::Args;
use plateshield_core::{
    Email, EmailError, OrderId, PhotoToken, PhotoTokenData, PhotoTokenError, Registration,
    RegistrationError, VehicleAttributes,
};
use plateshield_storefront::{kv::KvError, services::EmailError as SendError};
use thiserror::Error;

use super::{SetupError, load_state};

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Error)]
pub enum TokenCommandError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Invalid token: {0}")]
    Token(#[from] PhotoTokenError),

    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("Invalid registration: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Key-value store error: {0}")]
    Kv(#[from] KvError),

    #[error("Failed to send email: {0}")]
    Send(#[from] SendError),

    #[error("Failed to encode token data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token not found or expired")]
    NotFound,
}

/// Order and vehicle details for a hand-issued token.
#[derive(Debug, Args)]
pub struct IssueArgs {
    /// Numeric Shopify order ID
    #[arg(long)]
    pub order_id: u64,

    /// Order name as shown to the customer, e.g. #1001
    #[arg(long)]
    pub order_name: String,

    /// Customer email address
    #[arg(short, long)]
    pub email: String,

    /// Vehicle registration mark
    #[arg(short, long)]
    pub registration: String,

    /// Vehicle make
    #[arg(long)]
    pub make: String,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long)]
    pub variant: Option<String>,

    /// Also email the upload link to the customer
    #[arg(long)]
    pub send_email: bool,
}

/// Issue a token and print its upload link.
pub async fn issue(args: IssueArgs) -> Result<(), TokenCommandError> {
    let email = Email::parse(&args.email)?;
    let registration = Registration::parse(&args.registration)?;
    let state = load_state()?;

    let data = PhotoTokenData {
        shopify_order_id: OrderId::new(args.order_id),
        shopify_order_name: args.order_name,
        email,
        vehicle_data: VehicleAttributes {
            registration: registration.as_str().to_string(),
            make: args.make,
            model: args.model,
            year: args.year,
            variant: args.variant,
        },
        created_at: Utc::now(),
    };

    let token = state.photo_tokens().issue(&data).await?;
    let upload_url = state.config().photo_upload_url(token.as_str());

    if args.send_email {
        let valid_days = state.photo_tokens().ttl().as_secs() / SECONDS_PER_DAY;
        state
            .email()
            .send_photo_request(
                &data.email,
                &data.shopify_order_name,
                &data.vehicle_data,
                &upload_url,
                valid_days,
            )
            .await?;
        tracing::info!(to = %data.email, "Photo request email sent");
    }

    #[allow(clippy::print_stdout)]
    {
        println!("{upload_url}");
    }
    Ok(())
}

/// Print the data stored under a live token without consuming it.
pub async fn show(token: &str) -> Result<(), TokenCommandError> {
    let token = PhotoToken::parse(token)?;
    let state = load_state()?;

    let data = state
        .photo_tokens()
        .validate(&token)
        .await?
        .ok_or(TokenCommandError::NotFound)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}

/// Delete a token so its link stops working.
pub async fn revoke(token: &str) -> Result<(), TokenCommandError> {
    let token = PhotoToken::parse(token)?;
    let state = load_state()?;

    if !state.photo_tokens().revoke(&token).await? {
        return Err(TokenCommandError::NotFound);
    }
    tracing::info!("Photo token revoked");
    Ok(())
}
