//! One-time photo upload tokens.
//!
//! A token is issued when an order arrives with vehicle attributes and is
//! mailed to the customer. It can be validated any number of times while
//! live and redeemed exactly once. Unused tokens lapse with the store TTL.

use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use tracing::{info, instrument, warn};

use plateshield_core::{PhotoToken, PhotoTokenData};

use crate::kv::{KvError, KvStore};

const KEY_PREFIX: &str = "photo-token:";

fn token_key(token: &PhotoToken) -> String {
    format!("{KEY_PREFIX}{token}")
}

/// Issues, validates and redeems photo tokens.
#[derive(Clone)]
pub struct PhotoTokenService {
    store: KvStore,
    ttl: Duration,
}

impl PhotoTokenService {
    #[must_use]
    pub fn new(store: KvStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a token and store `data` under it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    #[instrument(skip(self, data), fields(order = %data.shopify_order_name))]
    pub async fn issue(&self, data: &PhotoTokenData) -> Result<PhotoToken, KvError> {
        let mut bytes = [0u8; PhotoToken::BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = PhotoToken::from_bytes(&bytes);

        self.store.set_json(&token_key(&token), data, self.ttl).await?;
        info!("Photo token issued");
        Ok(token)
    }

    /// Look up a live token without consuming it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the stored record is
    /// corrupt.
    pub async fn validate(&self, token: &PhotoToken) -> Result<Option<PhotoTokenData>, KvError> {
        self.store.get_json(&token_key(token)).await
    }

    /// Consume a token, returning its data if it was live.
    ///
    /// Concurrent redemptions of the same token see the data at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the stored record is
    /// corrupt.
    #[instrument(skip(self, token))]
    pub async fn redeem(&self, token: &PhotoToken) -> Result<Option<PhotoTokenData>, KvError> {
        self.store
            .take(&token_key(token))
            .await?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(KvError::from)
    }

    /// Put a redeemed token back for the rest of its original lifetime.
    ///
    /// Returns `false` if the lifetime has already run out.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    #[instrument(skip(self, token, data), fields(order = %data.shopify_order_name))]
    pub async fn restore(
        &self,
        token: &PhotoToken,
        data: &PhotoTokenData,
    ) -> Result<bool, KvError> {
        let Some(remaining) = self.remaining_lifetime(data) else {
            warn!("Photo token expired before it could be restored");
            return Ok(false);
        };
        self.store.set_json(&token_key(token), data, remaining).await?;
        info!(remaining_secs = remaining.as_secs(), "Photo token restored");
        Ok(true)
    }

    /// Delete a token. Returns `true` if it was live.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn revoke(&self, token: &PhotoToken) -> Result<bool, KvError> {
        self.store.delete(&token_key(token)).await
    }

    fn remaining_lifetime(&self, data: &PhotoTokenData) -> Option<Duration> {
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        let remaining = (data.created_at + ttl - Utc::now()).to_std().ok()?;
        (!remaining.is_zero()).then_some(remaining)
    }
}
