//! Error types for provisioning helpers.

use mqkit_common::AdminError;
use thiserror::Error;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors surfaced by the operations that do not degrade to a boolean.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Admin client call failed
    #[error("Admin error: {0}")]
    Admin(#[from] AdminError),

    /// The remote state did not match what the operation requires to start
    #[error("Precondition failed for topic {topic}: {reason}")]
    Precondition { topic: String, reason: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for ProvisionError {
    fn from(e: std::io::Error) -> Self {
        ProvisionError::Config(e.to_string())
    }
}

impl From<toml::de::Error> for ProvisionError {
    fn from(e: toml::de::Error) -> Self {
        ProvisionError::Config(e.to_string())
    }
}
