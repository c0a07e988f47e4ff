//! Shopify Admin GraphQL client.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::instrument;

use plateshield_core::OrderId;

use crate::config::ShopifyAdminConfig;

use super::{GraphQLError, ShopifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const ORDER_CUSTOM_ATTRIBUTES: &str = r"
query OrderCustomAttributes($id: ID!) {
  order(id: $id) {
    id
    customAttributes { key value }
  }
}";

const ORDER_UPDATE: &str = r"
mutation OrderUpdateCustomAttributes($input: OrderInput!) {
  orderUpdate(input: $input) {
    order { id }
    userErrors { field message }
  }
}";

/// A custom attribute on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// Shopify Admin API client.
///
/// Authenticated with a custom app access token, which carries write access
/// to orders.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<AdminClientInner>,
}

struct AdminClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct OrderCustomAttributesData {
    order: Option<OrderNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderNode {
    #[serde(default)]
    custom_attributes: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderUpdateData {
    order_update: Option<OrderUpdatePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderUpdatePayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    field: Option<Vec<String>>,
    message: String,
}

impl AdminClient {
    /// Create a new Admin API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ShopifyAdminConfig) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(AdminClientInner {
                client,
                endpoint: format!(
                    "{}/admin/api/{}/graphql.json",
                    config.base_url.trim_end_matches('/'),
                    config.api_version
                ),
                access_token: config.access_token.clone(),
            }),
        })
    }

    /// Execute a GraphQL operation.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ShopifyError> {
        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("X-Shopify-Access-Token", self.inner.access_token.expose_secret())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(2);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ShopifyError::Unauthorized(
                "Admin API access token rejected".to_string(),
            ));
        }

        let response = response.error_for_status()?;
        let graphql_response: GraphQLResponse<T> = response.json().await?;

        if let Some(errors) = graphql_response.errors
            && !errors.is_empty()
        {
            return Err(ShopifyError::GraphQL(errors));
        }

        graphql_response.data.ok_or_else(|| {
            ShopifyError::GraphQL(vec![GraphQLError {
                message: "No data in response".to_string(),
                path: vec![],
            }])
        })
    }

    /// Get an order's custom attributes.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::NotFound` if the order does not exist, or
    /// another error if the API request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn order_custom_attributes(&self, id: OrderId) -> Result<Vec<Attribute>, ShopifyError> {
        let data: OrderCustomAttributesData = self
            .execute(ORDER_CUSTOM_ATTRIBUTES, json!({ "id": id.to_gid() }))
            .await?;

        data.order
            .map(|order| order.custom_attributes)
            .ok_or_else(|| ShopifyError::NotFound(id.to_gid()))
    }

    /// Set custom attributes on an order, keeping the ones not being set.
    ///
    /// `orderUpdate` replaces the whole attribute list, so the current list
    /// is read first and merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the order cannot be read, the API request fails,
    /// or Shopify rejects the update.
    #[instrument(skip(self, updates), fields(order_id = %id))]
    pub async fn merge_custom_attributes(
        &self,
        id: OrderId,
        updates: Vec<Attribute>,
    ) -> Result<(), ShopifyError> {
        let existing = self.order_custom_attributes(id).await?;
        let merged = merge_attributes(existing, updates);

        let data: OrderUpdateData = self
            .execute(
                ORDER_UPDATE,
                json!({ "input": { "id": id.to_gid(), "customAttributes": merged } }),
            )
            .await?;

        if let Some(payload) = data.order_update
            && !payload.user_errors.is_empty()
        {
            let error_messages: Vec<String> = payload
                .user_errors
                .iter()
                .map(|e| {
                    let field = e.field.as_ref().map_or_else(String::new, |f| f.join("."));
                    format!("{}: {}", field, e.message)
                })
                .collect();
            return Err(ShopifyError::UserError(error_messages.join("; ")));
        }

        Ok(())
    }
}

/// Replace attributes whose key appears in `updates`, append the rest.
///
/// `AttributeInput.value` is non-null, so existing null values are sent
/// back as empty strings.
fn merge_attributes(existing: Vec<Attribute>, updates: Vec<Attribute>) -> Vec<Attribute> {
    let mut merged: Vec<Attribute> = existing
        .into_iter()
        .filter(|attr| !updates.iter().any(|u| u.key == attr.key))
        .map(|attr| Attribute {
            value: Some(attr.value.unwrap_or_default()),
            ..attr
        })
        .collect();
    merged.extend(updates);
    merged
}
