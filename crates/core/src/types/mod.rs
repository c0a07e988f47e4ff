//! Core types for Plateshield.
//!
//! This module provides type-safe wrappers for the vehicle verification domain.

pub mod attributes;
pub mod email;
pub mod id;
pub mod photo_token;
pub mod registration;
pub mod vehicle;

pub use attributes::{AttributeKey, VehicleAttributes};
pub use email::{Email, EmailError};
pub use id::*;
pub use photo_token::{PhotoToken, PhotoTokenData, PhotoTokenError};
pub use registration::{Registration, RegistrationError};
pub use vehicle::VehicleData;
