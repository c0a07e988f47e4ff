//! CLI command implementations.

pub mod token;
pub mod vehicle;
pub mod webhook;

use plateshield_storefront::{
    config::{ConfigError, StorefrontConfig},
    state::{AppState, StateError},
};
use thiserror::Error;

/// Errors shared by commands that need the full application state.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialize services: {0}")]
    State(#[from] StateError),
}

/// Load configuration and build the same services the server runs with.
pub fn load_state() -> Result<AppState, SetupError> {
    let config = StorefrontConfig::from_env()?;
    let state = AppState::new(config)?;
    tracing::debug!(kv_backend = state.kv().backend_name(), "Services initialized");
    Ok(state)
}
