use std::sync::Arc;
use surge_core::ConfigError;
use thiserror::Error;

/// Reasons a run stops before its first stage.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Setup step `{operation}` failed: {reason}")]
    Setup { operation: String, reason: String },
}

/// A failed step inside one iteration. Recorded as a failed sample, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("Authentication `{operation}` failed: {reason}")]
    AuthFailure { operation: Arc<str>, reason: String },

    #[error("Request `{operation}` failed: {reason}")]
    RequestFailure { operation: Arc<str>, reason: String },
}

impl StepError {
    pub fn operation(&self) -> &str {
        match self {
            StepError::AuthFailure { operation, .. }
            | StepError::RequestFailure { operation, .. } => operation,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            StepError::AuthFailure { reason, .. } | StepError::RequestFailure { reason, .. } => {
                reason
            }
        }
    }
}
