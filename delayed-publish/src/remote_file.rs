//! Create-or-update of a single file in the target repository.
//!
//! The observed version token from [`RemoteFileSync::load_existing`] is sent
//! back with the write, so a file that changed in between is rejected by the
//! remote instead of silently overwritten.

use sha2::{Digest, Sha256};

use delayed_core::{CommitIdentity, RepoSlug};

use crate::client::{ClientError, ContentDelete, ContentWrite, Lookup, RepoClient};
use crate::error::{read_err, PublishError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the target path held when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileState {
    pub path: String,
    pub exists: bool,
    /// Remote version token, sent back as the concurrency check on write.
    pub content_hash: Option<String>,
    /// SHA-256 hex of the remote bytes.
    pub digest: Option<String>,
    pub content: Option<Vec<u8>>,
}

impl RemoteFileState {
    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            content_hash: None,
            digest: None,
            content: None,
        }
    }

    /// Remote content as text, empty when the file does not exist.
    pub fn text(&self) -> String {
        self.content
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

/// A file to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub branch: String,
    pub content: Vec<u8>,
    pub identity: CommitIdentity,
    pub message: String,
}

/// Outcome of [`RemoteFileSync::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was created or replaced.
    Written {
        path: String,
        content_hash: String,
        commit_sha: String,
    },
    /// The remote already held identical content; nothing was written.
    Unchanged { path: String },
}

/// Outcome of [`RemoteFileSync::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed { path: String },
    AlreadyRemoved { path: String },
}

/// SHA-256 hex digest used to compare local and remote content.
pub fn content_digest(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}

// ---------------------------------------------------------------------------
// RemoteFileSync
// ---------------------------------------------------------------------------

/// File operations against one repository.
pub struct RemoteFileSync<'a, C: RepoClient + ?Sized> {
    client: &'a C,
    repo: &'a RepoSlug,
}

impl<'a, C: RepoClient + ?Sized> RemoteFileSync<'a, C> {
    pub fn new(client: &'a C, repo: &'a RepoSlug) -> Self {
        Self { client, repo }
    }

    /// Read `path` at `git_ref`. A missing file is `exists: false`, not an error.
    pub async fn load_existing(
        &self,
        path: &str,
        git_ref: &str,
    ) -> Result<RemoteFileState, PublishError> {
        let lookup = self
            .client
            .get_content(self.repo, path, git_ref)
            .await
            .map_err(|e| read_err(format!("{path}@{git_ref} in {}", self.repo), e))?;

        Ok(match lookup {
            Lookup::Found(remote) => {
                tracing::debug!(path, git_ref, sha = %remote.sha, "target file exists");
                RemoteFileState {
                    path: path.to_string(),
                    exists: true,
                    digest: Some(content_digest(&remote.content)),
                    content_hash: Some(remote.sha),
                    content: Some(remote.content),
                }
            }
            Lookup::NotFound => {
                tracing::debug!(path, git_ref, "target file does not exist");
                RemoteFileState::absent(path)
            }
        })
    }

    /// Create or replace the file described by `write`.
    ///
    /// The overwrite policy is checked before anything is sent. Identical
    /// content is reported as [`WriteOutcome::Unchanged`] without a write.
    pub async fn publish(
        &self,
        existing: &RemoteFileState,
        write: FileWrite,
        override_allowed: bool,
    ) -> Result<WriteOutcome, PublishError> {
        ensure_overwrite_allowed(existing, override_allowed)?;

        if existing.digest.as_deref() == Some(content_digest(&write.content).as_str()) {
            tracing::info!(path = %write.path, "unchanged: remote content is identical");
            return Ok(WriteOutcome::Unchanged { path: write.path });
        }

        let request = ContentWrite {
            path: write.path,
            branch: write.branch,
            content: write.content,
            message: write.message,
            author: write.identity,
            expected_sha: existing.content_hash.clone(),
        };
        let written = self
            .client
            .put_content(self.repo, &request)
            .await
            .map_err(|e| write_err(&request.path, e))?;

        tracing::info!(
            path = %request.path,
            branch = %request.branch,
            commit = %written.commit_sha,
            "wrote"
        );
        Ok(WriteOutcome::Written {
            path: request.path,
            content_hash: written.content_sha,
            commit_sha: written.commit_sha,
        })
    }

    /// Delete the file `existing` describes from `branch`.
    pub async fn remove(
        &self,
        existing: &RemoteFileState,
        branch: &str,
        message: &str,
        identity: &CommitIdentity,
    ) -> Result<RemoveOutcome, PublishError> {
        let Some(sha) = existing.content_hash.clone() else {
            tracing::info!(path = %existing.path, "already removed");
            return Ok(RemoveOutcome::AlreadyRemoved {
                path: existing.path.clone(),
            });
        };

        let request = ContentDelete {
            path: existing.path.clone(),
            branch: branch.to_string(),
            message: message.to_string(),
            author: identity.clone(),
            sha,
        };
        let deleted = self
            .client
            .delete_content(self.repo, &request)
            .await
            .map_err(|e| write_err(&request.path, e))?;

        Ok(match deleted {
            Lookup::Found(()) => {
                tracing::info!(path = %request.path, branch, "removed");
                RemoveOutcome::Removed { path: request.path }
            }
            Lookup::NotFound => RemoveOutcome::AlreadyRemoved { path: request.path },
        })
    }
}

/// Fail with [`PublishError::FileAlreadyExists`] when `state` exists and may
/// not be replaced.
pub fn ensure_overwrite_allowed(
    state: &RemoteFileState,
    override_allowed: bool,
) -> Result<(), PublishError> {
    if state.exists && !override_allowed {
        return Err(PublishError::FileAlreadyExists {
            path: state.path.clone(),
        });
    }
    Ok(())
}

fn write_err(path: &str, source: ClientError) -> PublishError {
    let concurrent = match &source {
        ClientError::Conflict(_) => true,
        ClientError::Status { status: 422, message } => message.contains("sha"),
        _ => false,
    };
    if concurrent {
        PublishError::ConcurrentModification {
            path: path.to_string(),
            source,
        }
    } else {
        PublishError::RemoteWrite {
            path: path.to_string(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
