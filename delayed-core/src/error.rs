//! Error types for delayed-core.

use thiserror::Error;

/// Errors raised while assembling run configuration from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required context value (usually an environment variable) is unset or empty.
    #[error("required context value {name} is not set")]
    MissingContext { name: String },

    /// A repository slug did not have the `owner/repo` shape.
    #[error("invalid repository '{value}': expected 'owner/repo'")]
    InvalidRepository { value: String },
}

/// All errors that can arise while injecting scheduling metadata into a
/// job-definition document.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The document is not valid YAML or has a malformed shape.
    #[error("failed to parse job definition: {reason}")]
    Parse { reason: String },

    /// `jobs` is missing, not a mapping, or empty.
    #[error("job definition not found: document has no jobs")]
    NoJobs,

    /// Strict single-job policy was requested but the document has more jobs.
    #[error("multiple job definitions found ({count}); single-job policy allows exactly one")]
    MultipleJobs { count: usize },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Convenience constructor for [`TransformError::Parse`].
pub(crate) fn parse_err(reason: impl Into<String>) -> TransformError {
    TransformError::Parse {
        reason: reason.into(),
    }
}
