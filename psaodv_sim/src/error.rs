//! Harness error types.

use psaodv_core::ConfigError;
use psaodv_env::EnvError;
use thiserror::Error;

/// Errors surfaced by the simulation harness.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Mobility source error: {0}")]
    Env(#[from] EnvError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
