//! Error types for health checks.

use thiserror::Error;

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Errors that can occur while evaluating health checks.
#[derive(Debug, Clone, Error)]
pub enum HealthError {
    /// A check never passed before its timeout.
    #[error("check '{check}' did not pass within {timeout_secs}s after {attempts} attempts: {last}")]
    Timeout {
        check: String,
        timeout_secs: u64,
        attempts: u32,
        last: String,
    },

    /// A single attempt could not be carried out.
    #[error("check '{check}' could not run: {reason}")]
    Attempt { check: String, reason: String },

    /// The check itself is malformed.
    #[error("invalid check '{check}': {reason}")]
    Invalid { check: String, reason: String },
}

impl HealthError {
    pub fn attempt(check: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        HealthError::Attempt {
            check: check.into(),
            reason: reason.to_string(),
        }
    }
}
