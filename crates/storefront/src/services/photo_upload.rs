//! Redeeming a photo token with the customer's photos.
//!
//! The token is consumed first, so two concurrent uploads cannot both
//! proceed. If the CDN rejects an image the token is restored; a partner
//! image that was already stored is logged so it can be cleaned up. Once
//! both images are stored the token stays consumed; a failed order update
//! is reported with the stored URLs so an operator can attach them by hand.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use plateshield_core::{PhotoToken, PhotoTokenData};

use crate::kv::KvError;
use crate::shopify::{AdminClient, Attribute, ShopifyError};

use super::cloudinary::{CloudinaryClient, CloudinaryError};
use super::email::EmailService;
use super::images::ImagePayload;
use super::photo_tokens::PhotoTokenService;

pub const FRONT_PHOTO_ATTRIBUTE: &str = "Front Photo";
pub const REAR_PHOTO_ATTRIBUTE: &str = "Rear Photo";
pub const UPLOADED_AT_ATTRIBUTE: &str = "Photos Uploaded At";

/// CDN URLs of an order's photos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoUrls {
    pub front: String,
    pub rear: String,
}

/// Errors that can occur while processing a photo upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The token is unknown, expired or already used.
    #[error("Photo token not found")]
    TokenNotFound,

    /// The token store could not be reached.
    #[error("Token store error: {0}")]
    TokenStore(#[from] KvError),

    /// The CDN rejected an image. The token has been restored.
    #[error("Image upload failed: {0}")]
    Cdn(#[from] CloudinaryError),

    /// Images were stored but could not be attached to the order.
    #[error("Order update failed: {source}")]
    OrderUpdate {
        urls: PhotoUrls,
        #[source]
        source: ShopifyError,
    },
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub order: PhotoTokenData,
    pub urls: PhotoUrls,
}

/// Orchestrates token redemption, image storage and order write-back.
#[derive(Clone)]
pub struct PhotoUploadService {
    tokens: PhotoTokenService,
    cloudinary: CloudinaryClient,
    shopify: AdminClient,
    email: EmailService,
}

impl PhotoUploadService {
    #[must_use]
    pub fn new(
        tokens: PhotoTokenService,
        cloudinary: CloudinaryClient,
        shopify: AdminClient,
        email: EmailService,
    ) -> Self {
        Self {
            tokens,
            cloudinary,
            shopify,
            email,
        }
    }

    /// Store both photos and attach them to the token's order.
    ///
    /// The operator is notified in the background once the order is
    /// updated.
    ///
    /// # Errors
    ///
    /// See [`UploadError`].
    #[instrument(skip_all)]
    pub async fn upload(
        &self,
        token: &PhotoToken,
        front: &ImagePayload,
        rear: &ImagePayload,
    ) -> Result<UploadOutcome, UploadError> {
        let order = self
            .tokens
            .redeem(token)
            .await?
            .ok_or(UploadError::TokenNotFound)?;

        info!(
            order = %order.shopify_order_name,
            front_bytes = front.size(),
            rear_bytes = rear.size(),
            "Photo token redeemed"
        );

        let urls = match self.store_images(&order, front, rear).await {
            Ok(urls) => urls,
            Err(e) => {
                self.restore_token(token, &order).await;
                return Err(e.into());
            }
        };

        let attributes = vec![
            Attribute::new(FRONT_PHOTO_ATTRIBUTE, urls.front.clone()),
            Attribute::new(REAR_PHOTO_ATTRIBUTE, urls.rear.clone()),
            Attribute::new(
                UPLOADED_AT_ATTRIBUTE,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ];
        if let Err(source) = self
            .shopify
            .merge_custom_attributes(order.shopify_order_id, attributes)
            .await
        {
            error!(
                order = %order.shopify_order_name,
                front = %urls.front,
                rear = %urls.rear,
                error = %source,
                "Photos stored but order update failed"
            );
            return Err(UploadError::OrderUpdate { urls, source });
        }

        info!(order = %order.shopify_order_name, "Photos attached to order");
        self.notify_operator(&order, &urls);

        Ok(UploadOutcome { order, urls })
    }

    async fn store_images(
        &self,
        order: &PhotoTokenData,
        front: &ImagePayload,
        rear: &ImagePayload,
    ) -> Result<PhotoUrls, CloudinaryError> {
        let stamp = Utc::now().timestamp();
        let order_id = order.shopify_order_id.as_u64();
        let front_id = format!("order-{order_id}-front-{stamp}");
        let rear_id = format!("order-{order_id}-rear-{stamp}");

        let front_uri = front.data_uri();
        let rear_uri = rear.data_uri();

        let (front, rear) = tokio::join!(
            self.cloudinary.upload_image(&front_uri, &front_id),
            self.cloudinary.upload_image(&rear_uri, &rear_id),
        );

        match (front, rear) {
            (Ok(front), Ok(rear)) => Ok(PhotoUrls {
                front: front.secure_url,
                rear: rear.secure_url,
            }),
            (Ok(stored), Err(e)) | (Err(e), Ok(stored)) => {
                error!(
                    order = %order.shopify_order_name,
                    stored = %stored.secure_url,
                    error = %e,
                    "One photo stored but the other failed; stored image is orphaned"
                );
                Err(e)
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    async fn restore_token(&self, token: &PhotoToken, order: &PhotoTokenData) {
        if let Err(e) = self.tokens.restore(token, order).await {
            error!(
                order = %order.shopify_order_name,
                error = %e,
                "Failed to restore photo token after upload failure"
            );
        }
    }

    fn notify_operator(&self, order: &PhotoTokenData, urls: &PhotoUrls) {
        let email = self.email.clone();
        let order = order.clone();
        let urls = urls.clone();

        tokio::spawn(async move {
            if let Err(e) = email
                .send_photos_received(
                    &order.shopify_order_name,
                    &order.vehicle_data,
                    &urls.front,
                    &urls.rear,
                )
                .await
            {
                warn!(
                    order = %order.shopify_order_name,
                    error = %e,
                    "Failed to notify operator of uploaded photos"
                );
            }
        });
    }
}
