//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers
//! 5. Burst rate limiting on token endpoints (governor)
//!
//! The per-client sliding window on vehicle lookups is not a layer: it only
//! applies to cache misses, so the handler consults it directly.

pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use rate_limit::{ClientIp, client_key, token_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
