//! Error types for delayed-publish.

use std::path::PathBuf;

use thiserror::Error;

use delayed_core::{ConfigError, TransformError};

use crate::client::ClientError;

/// All errors that can arise from publish and unschedule runs.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A required context value is unset.
    #[error("required context value {name} is not set")]
    MissingContext { name: String },

    #[error("invalid repository '{value}': expected 'owner/repo'")]
    InvalidRepository { value: String },

    /// The template workflow does not exist in the workspace.
    #[error("template file not found: {path}")]
    TemplateNotFound { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The target file exists and overriding it was not allowed.
    #[error("target file {path} already exists; set override to replace it")]
    FileAlreadyExists { path: String },

    /// A read against the hosting API failed for a reason other than "not found".
    #[error("failed to read {what}: {source}")]
    RemoteRead {
        what: String,
        #[source]
        source: ClientError,
    },

    /// The target file changed between the read and the write.
    #[error("{path} was modified concurrently: {source}")]
    ConcurrentModification {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to move tag {tag}: {source}")]
    RefMutation {
        tag: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to write {path}: {source}")]
    RemoteWrite {
        path: String,
        #[source]
        source: ClientError,
    },
}

impl From<ConfigError> for PublishError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingContext { name } => PublishError::MissingContext { name },
            ConfigError::InvalidRepository { value } => PublishError::InvalidRepository { value },
        }
    }
}

/// Convenience constructor for [`PublishError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PublishError {
    PublishError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`PublishError::RemoteRead`].
pub(crate) fn read_err(what: impl Into<String>, source: ClientError) -> PublishError {
    PublishError::RemoteRead {
        what: what.into(),
        source,
    }
}
