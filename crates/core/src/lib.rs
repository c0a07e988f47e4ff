//! Plateshield Core - Shared domain types.
//!
//! This crate provides the types shared by the Plateshield components:
//! - `storefront` - Vehicle lookup, photo token and order webhook service
//! - `cli` - Operator tooling for the cache and photo tokens
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no key-value
//! access, no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Registration marks, vehicle records, photo tokens, order IDs and
//!   the vehicle attributes carried on Shopify carts and line items

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
