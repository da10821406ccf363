use thiserror::Error;

/// Fatal problems with a run configuration. Raised before any virtual user starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid base URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid stages: {0}")]
    Stages(String),

    #[error("Invalid threshold `{expression}` on `{metric}`: {reason}")]
    Threshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("Invalid step `{step}`: {reason}")]
    Step { step: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn threshold(metric: &str, expression: &str, reason: impl Into<String>) -> Self {
        Self::Threshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}
