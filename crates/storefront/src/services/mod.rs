//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `vehicle_lookup` - Cache-aside registration lookup
//! - `rate_limit` - Sliding-window limiter for lookups
//! - `photo_tokens` - One-time photo upload tokens
//! - `photo_upload` - Token redemption, image storage and order write-back
//! - `images` - Base64 image validation
//! - `cloudinary` - Image CDN client
//! - `email` - Transactional email (Resend)

pub mod cloudinary;
pub mod email;
pub mod images;
pub mod photo_tokens;
pub mod photo_upload;
pub mod rate_limit;
pub mod vehicle_lookup;

pub use cloudinary::{CloudinaryClient, CloudinaryError};
pub use email::{EmailError, EmailService};
pub use images::{ImageError, ImagePayload};
pub use photo_tokens::PhotoTokenService;
pub use photo_upload::{PhotoUploadService, PhotoUrls, UploadError};
pub use rate_limit::{LookupRateLimiter, RateLimitDecision};
pub use vehicle_lookup::{LookupError, LookupOutcome, VehicleLookupService};
