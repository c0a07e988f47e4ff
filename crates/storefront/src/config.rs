//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL of the storefront (used in photo links)
//! - `SHOPIFY_STORE` - Shopify store domain (e.g., your-store.myshopify.com)
//! - `SHOPIFY_ADMIN_ACCESS_TOKEN` - Admin API access token (order write-back)
//! - `CLOUDINARY_CLOUD_NAME` - Cloudinary cloud name
//! - `CLOUDINARY_API_KEY` - Cloudinary API key
//! - `CLOUDINARY_API_SECRET` - Cloudinary API secret
//! - `RESEND_API_KEY` - Resend transactional email API key
//! - `EMAIL_FROM` - Sender address for transactional email
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `REDIS_URL` - Managed Redis URL (default: in-process store)
//! - `UKVD_API_KEY` - Vehicle data API key (lookups answer 503 without it)
//! - `UKVD_PACKAGE_NAME` - Vehicle data package (default: `VehicleDetails`)
//! - `UKVD_BASE_URL` - Vehicle data API base URL
//! - `VEHICLE_LOOKUP_LIMIT` - Uncached lookups per window per client (default: 3)
//! - `VEHICLE_LOOKUP_WINDOW_SECS` - Rate limit window (default: 3600)
//! - `VEHICLE_CACHE_TTL_DAYS` - Vehicle cache lifetime (default: 30)
//! - `PHOTO_TOKEN_TTL_DAYS` - Photo token lifetime (default: 7)
//! - `MAX_UPLOAD_BYTES` - Request body limit for photo uploads (default: room for two maximum-size images)
//! - `SHOPIFY_API_VERSION` - API version (default: 2026-01)
//! - `SHOPIFY_ADMIN_BASE_URL` - Admin API origin (default: `https://{SHOPIFY_STORE}`)
//! - `SHOPIFY_WEBHOOK_SECRET` - Webhook signing secret (webhooks answer 401 without it)
//! - `CLOUDINARY_FOLDER` - Upload folder (default: vehicle-photos)
//! - `CLOUDINARY_BASE_URL` - Cloudinary API base URL
//! - `OPERATOR_EMAIL` - Recipient of "photos received" notifications
//! - `RESEND_BASE_URL` - Resend API base URL
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sentry sampling

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::services::images::MAX_UPLOAD_BODY_BYTES;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;
const SECONDS_PER_DAY: u64 = 86_400;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Managed Redis URL; `None` selects the in-process store
    pub redis_url: Option<SecretString>,
    /// Vehicle data API configuration
    pub vehicle_data: VehicleDataConfig,
    /// Cache and rate limit policy for vehicle lookups
    pub lookup: LookupConfig,
    /// Photo upload token lifetime
    pub photo_token_ttl: Duration,
    /// Request body limit for the photo upload endpoint
    pub max_upload_bytes: usize,
    /// Shopify Admin API configuration
    pub shopify: ShopifyAdminConfig,
    /// Cloudinary image CDN configuration
    pub cloudinary: CloudinaryConfig,
    /// Transactional email configuration
    pub email: EmailConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Vehicle data API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct VehicleDataConfig {
    /// API key; lookups are unavailable without one
    pub api_key: Option<SecretString>,
    /// Data package requested from the API
    pub package_name: String,
    /// Base URL of the data package endpoint
    pub base_url: String,
}

impl std::fmt::Debug for VehicleDataConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleDataConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("package_name", &self.package_name)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Cache and rate limit policy for vehicle lookups.
#[derive(Debug, Clone, Copy)]
pub struct LookupConfig {
    /// Uncached lookups allowed per client per window
    pub rate_limit: u32,
    /// Sliding window length
    pub rate_window: Duration,
    /// Lifetime of cached vehicle records
    pub cache_ttl: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            rate_limit: 3,
            rate_window: Duration::from_secs(3600),
            cache_ttl: Duration::from_secs(30 * SECONDS_PER_DAY),
        }
    }
}

/// Shopify Admin API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ShopifyAdminConfig {
    /// Shopify store domain (e.g., your-store.myshopify.com)
    pub store: String,
    /// Shopify API version (e.g., 2026-01)
    pub api_version: String,
    /// Admin API origin, normally `https://{store}`
    pub base_url: String,
    /// Admin API access token
    pub access_token: SecretString,
    /// Shared secret used to sign webhooks
    pub webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for ShopifyAdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAdminConfig")
            .field("store", &self.store)
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Cloudinary image CDN configuration.
///
/// Implements `Debug` manually to redact the API secret.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
    /// Folder uploaded photos are stored under
    pub folder: String,
    pub base_url: String,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("folder", &self.folder)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Transactional email configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct EmailConfig {
    pub api_key: SecretString,
    /// Sender, e.g. `Plateshield <orders@plateshield.co.uk>`
    pub from_address: String,
    /// Recipient of operator notifications
    pub operator_address: Option<String>,
    pub base_url: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_key", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("operator_address", &self.operator_address)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_parsed_or_default("STOREFRONT_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = get_parsed_or_default("STOREFRONT_PORT", 3000_u16)?;
        let base_url = get_url("STOREFRONT_BASE_URL")?;
        let redis_url = get_optional_env("REDIS_URL").map(SecretString::from);

        let lookup = LookupConfig::from_env()?;
        let photo_token_ttl = Duration::from_secs(
            get_parsed_or_default("PHOTO_TOKEN_TTL_DAYS", 7_u64)? * SECONDS_PER_DAY,
        );
        let max_upload_bytes = get_parsed_or_default("MAX_UPLOAD_BYTES", MAX_UPLOAD_BODY_BYTES)?;

        Ok(Self {
            host,
            port,
            base_url,
            redis_url,
            vehicle_data: VehicleDataConfig::from_env()?,
            lookup,
            photo_token_ttl,
            max_upload_bytes,
            shopify: ShopifyAdminConfig::from_env()?,
            cloudinary: CloudinaryConfig::from_env()?,
            email: EmailConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed_or_default("SENTRY_SAMPLE_RATE", 1.0_f32)?,
            sentry_traces_sample_rate: get_parsed_or_default("SENTRY_TRACES_SAMPLE_RATE", 0.1_f32)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Link to the photo capture page for a token.
    #[must_use]
    pub fn photo_upload_url(&self, token: &str) -> String {
        format!(
            "{}/upload-photos?token={}",
            self.base_url.trim_end_matches('/'),
            token
        )
    }
}

impl VehicleDataConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_optional_env("UKVD_API_KEY").map(SecretString::from),
            package_name: get_env_or_default("UKVD_PACKAGE_NAME", "VehicleDetails"),
            base_url: get_url_or_default(
                "UKVD_BASE_URL",
                "https://uk1.ukvehicledata.co.uk/api/datapackage",
            )?,
        })
    }
}

impl LookupConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let rate_limit = get_parsed_or_default("VEHICLE_LOOKUP_LIMIT", defaults.rate_limit)?;
        if rate_limit == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "VEHICLE_LOOKUP_LIMIT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let window_secs = get_parsed_or_default(
            "VEHICLE_LOOKUP_WINDOW_SECS",
            defaults.rate_window.as_secs(),
        )?;
        let ttl_days = get_parsed_or_default(
            "VEHICLE_CACHE_TTL_DAYS",
            defaults.cache_ttl.as_secs() / SECONDS_PER_DAY,
        )?;

        Ok(Self {
            rate_limit,
            rate_window: Duration::from_secs(window_secs.max(1)),
            cache_ttl: Duration::from_secs(ttl_days * SECONDS_PER_DAY),
        })
    }
}

impl ShopifyAdminConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let store = get_required_env("SHOPIFY_STORE")?;
        let base_url = match get_optional_env("SHOPIFY_ADMIN_BASE_URL") {
            Some(_) => get_url("SHOPIFY_ADMIN_BASE_URL")?,
            None => format!("https://{store}"),
        };
        let webhook_secret = match get_optional_env("SHOPIFY_WEBHOOK_SECRET") {
            Some(_) => Some(get_validated_secret("SHOPIFY_WEBHOOK_SECRET")?),
            None => None,
        };

        Ok(Self {
            store,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", "2026-01"),
            base_url,
            access_token: get_validated_secret("SHOPIFY_ADMIN_ACCESS_TOKEN")?,
            webhook_secret,
        })
    }
}

impl CloudinaryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            cloud_name: get_required_env("CLOUDINARY_CLOUD_NAME")?,
            api_key: get_required_env("CLOUDINARY_API_KEY")?,
            api_secret: get_validated_secret("CLOUDINARY_API_SECRET")?,
            folder: get_env_or_default("CLOUDINARY_FOLDER", "vehicle-photos"),
            base_url: get_url_or_default("CLOUDINARY_BASE_URL", "https://api.cloudinary.com/v1_1")?,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_validated_secret("RESEND_API_KEY")?,
            from_address: get_required_env("EMAIL_FROM")?,
            operator_address: get_optional_env("OPERATOR_EMAIL"),
            base_url: get_url_or_default("RESEND_BASE_URL", "https://api.resend.com")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to a default when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Get a required absolute URL, without a trailing slash.
fn get_url(key: &str) -> Result<String, ConfigError> {
    let raw = get_required_env(key)?;
    validate_url(key, &raw)
}

/// Get an absolute URL with a default, without a trailing slash.
fn get_url_or_default(key: &str, default: &str) -> Result<String, ConfigError> {
    validate_url(key, &get_env_or_default(key, default))
}

fn validate_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", parsed.scheme()),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API keys and webhook secrets are hex or base62 with high entropy
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the value issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// Check whether a secret is present without exposing it.
pub(crate) fn has_secret(secret: Option<&SecretString>) -> bool {
    secret.is_some_and(|s| !s.expose_secret().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_config() -> StorefrontConfig {
        StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "https://plateshield.test".to_string(),
            redis_url: None,
            vehicle_data: VehicleDataConfig {
                api_key: Some(SecretString::from("ukvd_live_key_value")),
                package_name: "VehicleDetails".to_string(),
                base_url: "https://uk1.ukvehicledata.co.uk/api/datapackage".to_string(),
            },
            lookup: LookupConfig::default(),
            photo_token_ttl: Duration::from_secs(7 * SECONDS_PER_DAY),
            max_upload_bytes: 1024,
            shopify: ShopifyAdminConfig {
                store: "test.myshopify.com".to_string(),
                api_version: "2026-01".to_string(),
                base_url: "https://test.myshopify.com".to_string(),
                access_token: SecretString::from("shpat_super_secret_admin_token"),
                webhook_secret: Some(SecretString::from("super_secret_webhook_key")),
            },
            cloudinary: CloudinaryConfig {
                cloud_name: "demo".to_string(),
                api_key: "123456".to_string(),
                api_secret: SecretString::from("super_secret_cloudinary"),
                folder: "vehicle-photos".to_string(),
                base_url: "https://api.cloudinary.com/v1_1".to_string(),
            },
            email: EmailConfig {
                api_key: SecretString::from("re_super_secret_resend"),
                from_address: "orders@plateshield.test".to_string(),
                operator_address: None,
                base_url: "https://api.resend.com".to_string(),
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-webhook-secret", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_hex_secret() {
        // Shopify webhook secrets are 64 hex characters
        let result = validate_secret_strength(
            "8f2b1c9d4e7a6b3c0d5e8f1a2b4c6d9e0f3a5b7c9d1e2f4a6b8c0d2e4f6a8b0c",
            "TEST_VAR",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(
            validate_url("X", "https://plateshield.test/").unwrap(),
            "https://plateshield.test"
        );
        assert!(validate_url("X", "ftp://plateshield.test").is_err());
        assert!(validate_url("X", "not a url").is_err());
    }

    #[test]
    fn test_lookup_defaults() {
        let lookup = LookupConfig::default();
        assert_eq!(lookup.rate_limit, 3);
        assert_eq!(lookup.rate_window, Duration::from_secs(3600));
        assert_eq!(lookup.cache_ttl, Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn test_socket_addr() {
        let addr = sample_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_photo_upload_url() {
        let mut config = sample_config();
        config.base_url = "https://plateshield.test/".to_string();
        assert_eq!(
            config.photo_upload_url("abc"),
            "https://plateshield.test/upload-photos?token=abc"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug_output = format!("{:?}", sample_config());

        assert!(debug_output.contains("test.myshopify.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret"));
        assert!(!debug_output.contains("ukvd_live_key_value"));
    }

    #[test]
    fn test_has_secret() {
        assert!(!has_secret(None));
        assert!(!has_secret(Some(&SecretString::from(""))));
        assert!(has_secret(Some(&SecretString::from("x"))));
    }
}
