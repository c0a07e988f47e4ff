//! One-time photo upload tokens.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attributes::VehicleAttributes;
use super::email::Email;
use super::id::OrderId;

/// Errors that can occur when parsing a [`PhotoToken`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhotoTokenError {
    #[error("token is required")]
    Empty,
    #[error("token is malformed")]
    Malformed,
}

/// An opaque photo upload token: 32 random bytes as 64 lowercase hex characters.
///
/// The type only guarantees the shape. Whether a token is live is decided by
/// the token store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhotoToken(String);

impl PhotoToken {
    /// Number of random bytes in a token.
    pub const BYTES: usize = 32;

    /// Build a token from raw random bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; Self::BYTES]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parse a token presented by a client.
    ///
    /// Uppercase hex is accepted and lowercased.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not 64 hex characters.
    pub fn parse(input: &str) -> Result<Self, PhotoTokenError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PhotoTokenError::Empty);
        }
        if input.len() != Self::BYTES * 2 || !input.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PhotoTokenError::Malformed);
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhotoToken {
    type Error = PhotoTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhotoToken> for String {
    fn from(token: PhotoToken) -> Self {
        token.0
    }
}

/// The order a photo token was issued for.
///
/// Stored as JSON under the token; field names are shared with the
/// photo capture page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoTokenData {
    pub shopify_order_id: OrderId,
    pub shopify_order_name: String,
    pub email: Email,
    pub vehicle_data: VehicleAttributes,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_is_hex() {
        let token = PhotoToken::from_bytes(&[0xab; 32]);
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn test_parse_round_trip() {
        let token = PhotoToken::from_bytes(&[7; 32]);
        assert_eq!(PhotoToken::parse(token.as_str()).unwrap(), token);
    }

    #[test]
    fn test_parse_lowercases() {
        let upper = "AB".repeat(32);
        assert_eq!(PhotoToken::parse(&upper).unwrap().as_str(), "ab".repeat(32));
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(PhotoToken::parse(""), Err(PhotoTokenError::Empty));
        assert_eq!(PhotoToken::parse("abc"), Err(PhotoTokenError::Malformed));
        assert_eq!(
            PhotoToken::parse(&"zz".repeat(32)),
            Err(PhotoTokenError::Malformed)
        );
    }

    #[test]
    fn test_data_json_shape() {
        let data = PhotoTokenData {
            shopify_order_id: OrderId::new(1001),
            shopify_order_name: "#1001".to_string(),
            email: Email::parse("driver@example.com").unwrap(),
            vehicle_data: VehicleAttributes {
                registration: "AB12CDE".to_string(),
                make: "Tesla".to_string(),
                model: Some("Model 3".to_string()),
                year: Some(2019),
                variant: None,
            },
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["shopifyOrderId"], 1001);
        assert_eq!(json["shopifyOrderName"], "#1001");
        assert_eq!(json["vehicleData"]["registration"], "AB12CDE");

        let back: PhotoTokenData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }
}
