//! Deployment error types

use drover_health::{CheckPhase, HealthError};
use drover_registry::RegistryError;
use drover_types::{ConfigurationError, HostStage};
use std::path::PathBuf;
use thiserror::Error;

/// Deployment errors
///
/// Cloneable so a single batch build failure can be handed to every host
/// that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Cannot resolve build result for {host} at {}: {reason}", path.display())]
    LinkResolution {
        host: String,
        path: PathBuf,
        reason: String,
    },

    #[error("No build result cached for {0} after a successful build")]
    MissingArtifact(String),

    #[error("Transfer to {host} failed: {reason}")]
    Transfer { host: String, reason: String },

    #[error("Activation on {host} failed: {reason}")]
    Activation { host: String, reason: String },

    #[error("{phase} checks failed on {host}: {source}")]
    HealthCheck {
        host: String,
        phase: CheckPhase,
        #[source]
        source: HealthError,
    },

    #[error("Cannot reach {host}: {reason}")]
    Connectivity { host: String, reason: String },

    #[error("{host} did not come back within {waited_secs}s of the reboot")]
    RebootTimeout { host: String, waited_secs: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("{failed} of {total} hosts failed")]
    RunFailed { failed: usize, total: usize },
}

impl DeployError {
    /// Whether this failure belongs to the whole batch rather than one host
    pub fn is_batch_failure(&self) -> bool {
        matches!(
            self,
            DeployError::Build(_) | DeployError::Evaluation(_) | DeployError::LinkResolution { .. }
        )
    }
}

/// A per-host failure with the last stage the host reached
#[derive(Debug, Clone, Error)]
#[error("{host} failed after stage {stage}: {source}")]
pub struct HostFailure {
    pub host: String,
    pub stage: HostStage,
    #[source]
    pub source: DeployError,
}

impl HostFailure {
    pub fn new(host: impl Into<String>, stage: HostStage, source: DeployError) -> Self {
        Self {
            host: host.into(),
            stage,
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, DeployError::Cancelled)
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;
