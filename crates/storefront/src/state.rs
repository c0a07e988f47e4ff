//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::kv::{KvError, KvStore};
use crate::services::{
    CloudinaryClient, CloudinaryError, EmailError, EmailService, LookupRateLimiter,
    PhotoTokenService, PhotoUploadService, VehicleLookupService,
};
use crate::shopify::{AdminClient, ShopifyError};
use crate::vehicle_data::{VehicleDataClient, VehicleDataError};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("key-value store: {0}")]
    Kv(#[from] KvError),
    #[error("vehicle data client: {0}")]
    VehicleData(#[from] VehicleDataError),
    #[error("Shopify client: {0}")]
    Shopify(#[from] ShopifyError),
    #[error("Cloudinary client: {0}")]
    Cloudinary(#[from] CloudinaryError),
    #[error("email service: {0}")]
    Email(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// key-value store, upstream clients and configuration. Everything is
/// built once at startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    kv: KvStore,
    vehicle_lookup: VehicleLookupService,
    photo_tokens: PhotoTokenService,
    photo_upload: PhotoUploadService,
    email: EmailService,
}

impl AppState {
    /// Create application state, connecting to the key-value store named
    /// in the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis URL is invalid or an HTTP client fails
    /// to build.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let kv = KvStore::from_url(config.redis_url.as_ref())?;
        Self::with_store(config, kv)
    }

    /// Create application state over an existing key-value store.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client fails to build.
    pub fn with_store(config: StorefrontConfig, kv: KvStore) -> Result<Self, StateError> {
        let limiter = LookupRateLimiter::new(
            kv.clone(),
            config.lookup.rate_limit,
            config.lookup.rate_window,
        );
        let vehicle_lookup = VehicleLookupService::new(
            kv.clone(),
            VehicleDataClient::new(&config.vehicle_data)?,
            limiter,
            config.lookup.cache_ttl,
        );
        let photo_tokens = PhotoTokenService::new(kv.clone(), config.photo_token_ttl);
        let email = EmailService::new(&config.email)?;
        let photo_upload = PhotoUploadService::new(
            photo_tokens.clone(),
            CloudinaryClient::new(&config.cloudinary)?,
            AdminClient::new(&config.shopify)?,
            email.clone(),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                kv,
                vehicle_lookup,
                photo_tokens,
                photo_upload,
                email,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the key-value store.
    #[must_use]
    pub fn kv(&self) -> &KvStore {
        &self.inner.kv
    }

    #[must_use]
    pub fn vehicle_lookup(&self) -> &VehicleLookupService {
        &self.inner.vehicle_lookup
    }

    #[must_use]
    pub fn photo_tokens(&self) -> &PhotoTokenService {
        &self.inner.photo_tokens
    }

    #[must_use]
    pub fn photo_upload(&self) -> &PhotoUploadService {
        &self.inner.photo_upload
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }
}
