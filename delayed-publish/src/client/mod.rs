//! Repository-hosting API surface consumed by the publisher.
//!
//! Reads return [`Lookup`] so that "not found" is an ordinary outcome rather
//! than an error. Ref names are given without the `refs/` prefix
//! (`tags/v1.2`).

mod github;

pub use github::{GitHubClient, DEFAULT_API_URL};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ClientCall, FailPoint, FakeRepoClient};

use async_trait::async_trait;
use thiserror::Error;

use delayed_core::{CommitAuthor, CommitIdentity, RepoSlug};

/// Result of a read that may legitimately find nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

/// Errors from the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The write was rejected because the object changed since it was read.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// A ref and the object it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub name: String,
    pub sha: String,
}

/// A file blob as stored on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContent {
    /// Opaque version token; supplied back on update/delete.
    pub sha: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub author: CommitAuthor,
    /// Account that committed, when the commit is linked to one.
    pub committer_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub default_branch: String,
}

/// Create-or-update request for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentWrite {
    pub path: String,
    pub branch: String,
    pub content: Vec<u8>,
    pub message: String,
    pub author: CommitIdentity,
    /// Version token of the file being replaced; `None` creates a new file.
    pub expected_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDelete {
    pub path: String,
    pub branch: String,
    pub message: String,
    pub author: CommitIdentity,
    pub sha: String,
}

/// Outcome of a successful file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenContent {
    pub content_sha: String,
    pub commit_sha: String,
}

/// Remote repository operations. Implementations must not retry mutations.
#[async_trait]
pub trait RepoClient: Send + Sync {
    async fn get_ref(&self, repo: &RepoSlug, name: &str) -> Result<Lookup<GitRef>, ClientError>;

    async fn create_ref(&self, repo: &RepoSlug, name: &str, sha: &str) -> Result<GitRef, ClientError>;

    /// Move `name` to `sha`; `force` allows non-fast-forward moves.
    async fn update_ref(
        &self,
        repo: &RepoSlug,
        name: &str,
        sha: &str,
        force: bool,
    ) -> Result<GitRef, ClientError>;

    async fn delete_ref(&self, repo: &RepoSlug, name: &str) -> Result<Lookup<()>, ClientError>;

    /// Read `path` at `git_ref` (branch, tag or commit).
    async fn get_content(
        &self,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Lookup<RemoteContent>, ClientError>;

    async fn put_content(
        &self,
        repo: &RepoSlug,
        write: &ContentWrite,
    ) -> Result<WrittenContent, ClientError>;

    async fn delete_content(
        &self,
        repo: &RepoSlug,
        delete: &ContentDelete,
    ) -> Result<Lookup<()>, ClientError>;

    async fn get_commit(&self, repo: &RepoSlug, sha: &str) -> Result<Lookup<CommitInfo>, ClientError>;

    async fn get_repository(&self, repo: &RepoSlug) -> Result<Lookup<RepositoryInfo>, ClientError>;
}
