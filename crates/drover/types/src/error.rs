//! Configuration error types

use thiserror::Error;

/// Errors in the deployment description itself.
///
/// All of these are fatal and surface before any host pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("host {0} not in deployment")]
    UnknownHost(String),

    #[error("host {0} declared more than once")]
    DuplicateHost(String),

    #[error(
        "constraint '{label}'='{value}' has maxUnavailable == 0, \
         which would block every matching host forever"
    )]
    ZeroCapacityConstraint { label: String, value: String },

    #[error("no hosts selected")]
    NoHostsSelected,

    #[error("invalid deployment: {0}")]
    InvalidDeployment(String),
}

/// Result type for configuration checks
pub type Result<T> = std::result::Result<T, ConfigurationError>;
