//! Vehicle lookup and cache commands.
//!
//! # Usage
//!
//! ```bash
//! ps-cli lookup AB12CDE
//! ps-cli cache purge AB12CDE
//! ```

use plateshield_core::{Registration, RegistrationError};
use plateshield_storefront::{kv::KvError, services::LookupError};
use thiserror::Error;

use super::{SetupError, load_state};

#[derive(Debug, Error)]
pub enum VehicleCommandError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Invalid registration: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Key-value store error: {0}")]
    Kv(#[from] KvError),

    #[error("Failed to encode vehicle: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resolve a registration and print the vehicle as JSON.
///
/// Operator lookups are not charged against any client's rate limit, but
/// a successful uncached lookup still populates the cache.
pub async fn lookup(registration: &str) -> Result<(), VehicleCommandError> {
    let registration = Registration::parse(registration)?;
    let state = load_state()?;

    let outcome = state.vehicle_lookup().lookup(&registration, None).await?;
    tracing::info!(
        registration = %registration,
        cached = outcome.cached,
        "Lookup complete"
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&outcome.vehicle)?);
    }
    Ok(())
}

/// Remove a registration from the vehicle cache.
pub async fn purge(registration: &str) -> Result<(), VehicleCommandError> {
    let registration = Registration::parse(registration)?;
    let state = load_state()?;

    if state.vehicle_lookup().purge(&registration).await? {
        tracing::info!(registration = %registration, "Cached vehicle removed");
    } else {
        tracing::warn!(registration = %registration, "No cached vehicle for registration");
    }
    Ok(())
}
