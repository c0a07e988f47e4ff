//! Shopify order webhooks.
//!
//! Shopify signs each delivery with HMAC-SHA256 over the raw body using the
//! app's shared secret, base64 encoded in `X-Shopify-Hmac-Sha256`. Payloads
//! are parsed only after the signature checks out.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer};
use sha2::Sha256;
use thiserror::Error;

use plateshield_core::{OrderId, VehicleAttributes};

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const WEBHOOK_ID_HEADER: &str = "x-shopify-webhook-id";
pub const TOPIC_HEADER: &str = "x-shopify-topic";

type HmacSha256 = Hmac<Sha256>;

/// Errors that can occur when verifying a webhook.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    /// No shared secret configured, so nothing can be verified.
    #[error("Webhook secret is not configured")]
    SecretNotConfigured,

    /// The secret cannot be used as an HMAC key.
    #[error("Webhook secret is unusable")]
    InvalidSecret,

    /// The signature header is absent.
    #[error("Missing webhook signature")]
    MissingSignature,

    /// The signature does not match the body.
    #[error("Invalid webhook signature")]
    InvalidSignature,
}

/// Compute the `X-Shopify-Hmac-Sha256` value for a body.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSecret` if the secret cannot key an HMAC.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, WebhookError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a webhook signature in constant time.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` if the header is not valid
/// base64 or does not match the body.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> Result<(), WebhookError> {
    let provided = STANDARD
        .decode(signature.trim())
        .map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// The parts of an `orders/create` payload this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderWebhook {
    pub id: OrderId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub customer: Option<WebhookCustomer>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub note_attributes: Vec<NameValue>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub line_items: Vec<WebhookLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookCustomer {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookLineItem {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Vec<NameValue>,
}

/// A note attribute or line item property.
///
/// Values are strings in practice, but numbers and booleans are accepted
/// and stringified.
#[derive(Debug, Clone, Deserialize)]
pub struct NameValue {
    pub name: String,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub value: String,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Where on an order the vehicle attributes were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSource {
    /// Cart-level attributes, copied to the order as `note_attributes`.
    NoteAttributes,
    /// Properties of the first line item.
    LineItemProperties,
}

impl AttributeSource {
    /// Sources in the order they are tried.
    pub const PRIORITY: [Self; 2] = [Self::NoteAttributes, Self::LineItemProperties];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoteAttributes => "note_attributes",
            Self::LineItemProperties => "line_item_properties",
        }
    }

    /// Try to read a complete set of vehicle attributes from this source.
    #[must_use]
    pub fn extract(self, order: &OrderWebhook) -> Option<VehicleAttributes> {
        let pairs: &[NameValue] = match self {
            Self::NoteAttributes => &order.note_attributes,
            Self::LineItemProperties => &order.line_items.first()?.properties,
        };
        VehicleAttributes::from_pairs(pairs.iter().map(|p| (p.name.as_str(), p.value.as_str())))
    }
}

impl OrderWebhook {
    /// Vehicle attributes from the first source holding a complete set.
    #[must_use]
    pub fn vehicle_attributes(&self) -> Option<(AttributeSource, VehicleAttributes)> {
        AttributeSource::PRIORITY
            .into_iter()
            .find_map(|source| source.extract(self).map(|attrs| (source, attrs)))
    }

    /// Customer email, preferring the order email over the contact and
    /// customer record.
    #[must_use]
    pub fn customer_email(&self) -> Option<&str> {
        [
            self.email.as_deref(),
            self.contact_email.as_deref(),
            self.customer.as_ref().and_then(|c| c.email.as_deref()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|e| !e.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_shared_secret";

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"id":1}"#;
        let signature = sign(SECRET, body).unwrap();
        assert!(verify(SECRET, body, &signature).is_ok());
    }

    #[test]
    fn test_known_signature() {
        // echo -n 'hello' | openssl dgst -sha256 -hmac 'secret' -binary | base64
        assert_eq!(
            sign(b"secret", b"hello").unwrap(),
            "iKqz7ejTrflNJquQ07r9SiCDBww7zOnAFO4EpEOEfAs="
        );
    }

    #[test]
    fn test_rejects_tampered_body() {
        let signature = sign(SECRET, br#"{"id":1}"#).unwrap();
        assert_eq!(
            verify(SECRET, br#"{"id":2}"#, &signature),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let body = br#"{"id":1}"#;
        let signature = sign(b"another-secret", body).unwrap();
        assert_eq!(
            verify(SECRET, body, &signature),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn test_rejects_garbage_signature() {
        assert_eq!(
            verify(SECRET, b"{}", "not base64!"),
            Err(WebhookError::InvalidSignature)
        );
        assert_eq!(verify(SECRET, b"{}", ""), Err(WebhookError::InvalidSignature));
    }

    fn order(json: serde_json::Value) -> OrderWebhook {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_note_attributes_win() {
        let order = order(serde_json::json!({
            "id": 820_982_911_946_154_508_u64,
            "name": "#1001",
            "email": "driver@example.com",
            "note_attributes": [
                {"name": "registration", "value": "ab12 cde"},
                {"name": "make", "value": "Tesla"}
            ],
            "line_items": [{
                "id": 1,
                "properties": [
                    {"name": "_registration", "value": "XY99ZZZ"},
                    {"name": "_make", "value": "Ford"}
                ]
            }]
        }));

        let (source, attrs) = order.vehicle_attributes().unwrap();
        assert_eq!(source, AttributeSource::NoteAttributes);
        assert_eq!(attrs.registration, "AB12CDE");
        assert_eq!(attrs.make, "Tesla");
    }

    #[test]
    fn test_falls_back_to_line_item() {
        let order = order(serde_json::json!({
            "id": 1001,
            "name": "#1001",
            "note_attributes": [{"name": "registration", "value": "AB12CDE"}],
            "line_items": [{
                "properties": [
                    {"name": "_Registration", "value": "XY99ZZZ"},
                    {"name": "_Make", "value": "Ford"},
                    {"name": "_Year", "value": 2015}
                ]
            }]
        }));

        let (source, attrs) = order.vehicle_attributes().unwrap();
        assert_eq!(source, AttributeSource::LineItemProperties);
        assert_eq!(attrs.registration, "XY99ZZZ");
        assert_eq!(attrs.year, Some(2015));
    }

    #[test]
    fn test_no_vehicle_attributes() {
        let order = order(serde_json::json!({
            "id": 1001,
            "name": "#1001",
            "note_attributes": null,
            "line_items": []
        }));
        assert!(order.vehicle_attributes().is_none());
    }

    #[test]
    fn test_customer_email_fallback() {
        let order = order(serde_json::json!({
            "id": 1001,
            "name": "#1001",
            "email": "",
            "contact_email": null,
            "customer": {"email": "owner@example.com"}
        }));
        assert_eq!(order.customer_email(), Some("owner@example.com"));
    }
}
