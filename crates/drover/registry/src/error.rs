//! Registry error types

use drover_types::ConfigurationError;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("key {key} not found in store {store}")]
    NotFound { store: String, key: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("slot holder {0} was closed")]
    SlotHolderClosed(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
