//! CLI error types

use drover_deployment::DeployError;
use drover_types::ConfigurationError;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// The deployment description is invalid
    #[error("{0}")]
    Deployment(#[from] ConfigurationError),

    /// The rollout failed
    #[error("{0}")]
    Deploy(#[from] DeployError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML rendering error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl From<config::ConfigError> for CliError {
    fn from(e: config::ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
