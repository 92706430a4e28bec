//! In-memory repository client for tests.
//!
//! Files are keyed by `(branch, path)`; their version token is the SHA-256 of
//! the content. Every call is recorded, and any operation can be made to fail
//! once with [`FakeRepoClient::fail_next`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use delayed_core::{CommitAuthor, RepoSlug};

use super::{
    ClientError, CommitInfo, ContentDelete, ContentWrite, GitRef, Lookup, RemoteContent,
    RepoClient, RepositoryInfo, WrittenContent,
};

/// Recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    GetRef { name: String },
    CreateRef { name: String, sha: String },
    UpdateRef { name: String, sha: String, force: bool },
    DeleteRef { name: String },
    GetContent { path: String, git_ref: String },
    PutContent { path: String, branch: String, expected_sha: Option<String> },
    DeleteContent { path: String, branch: String, sha: String },
    GetCommit { sha: String },
    GetRepository { repo: RepoSlug },
}

impl ClientCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ClientCall::CreateRef { .. }
                | ClientCall::UpdateRef { .. }
                | ClientCall::DeleteRef { .. }
                | ClientCall::PutContent { .. }
                | ClientCall::DeleteContent { .. }
        )
    }
}

/// Operation that [`FakeRepoClient::fail_next`] can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    GetRef,
    CreateRef,
    UpdateRef,
    DeleteRef,
    GetContent,
    PutContent,
    DeleteContent,
    GetCommit,
    GetRepository,
}

struct FakeState {
    default_branch: String,
    refs: HashMap<String, String>,
    files: HashMap<(String, String), Vec<u8>>,
    commits: HashMap<String, CommitInfo>,
    failures: HashMap<FailPoint, ClientError>,
    calls: Vec<ClientCall>,
    commit_counter: u64,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            refs: HashMap::new(),
            files: HashMap::new(),
            commits: HashMap::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            commit_counter: 0,
        }
    }
}

/// Fake repository client for testing
#[derive(Clone, Default)]
pub struct FakeRepoClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRepoClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_default_branch(self, branch: &str) -> Self {
        self.lock().default_branch = branch.to_string();
        self
    }

    /// Register a commit authored by `name <email>`.
    pub fn with_commit(self, sha: &str, name: &str, email: &str, committer_login: Option<&str>) -> Self {
        self.lock().commits.insert(
            sha.to_string(),
            CommitInfo {
                sha: sha.to_string(),
                author: CommitAuthor {
                    name: name.to_string(),
                    email: email.to_string(),
                },
                committer_login: committer_login.map(str::to_owned),
            },
        );
        self
    }

    pub fn with_tag(self, tag: &str, sha: &str) -> Self {
        self.lock()
            .refs
            .insert(format!("tags/{tag}"), sha.to_string());
        self
    }

    pub fn with_file(self, branch: &str, path: &str, content: &str) -> Self {
        self.lock().files.insert(
            (branch.to_string(), path.to_string()),
            content.as_bytes().to_vec(),
        );
        self
    }

    /// Make the next call of `point` fail with `error`.
    pub fn fail_next(&self, point: FailPoint, error: ClientError) {
        self.lock().failures.insert(point, error);
    }

    /// Replace a file without going through the client, as another actor would.
    pub fn set_file(&self, branch: &str, path: &str, content: &str) {
        self.lock().files.insert(
            (branch.to_string(), path.to_string()),
            content.as_bytes().to_vec(),
        );
    }

    /// Commit a tag currently points at.
    pub fn tag(&self, tag: &str) -> Option<String> {
        self.lock().refs.get(&format!("tags/{tag}")).cloned()
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&(branch.to_string(), path.to_string()))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ClientCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls that would change the remote.
    pub fn mutations(&self) -> Vec<ClientCall> {
        self.calls().into_iter().filter(ClientCall::is_mutation).collect()
    }

    /// Version token the fake assigns to `content`.
    pub fn token_for(content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))
    }

    fn begin(&self, call: ClientCall, point: FailPoint) -> Result<MutexGuard<'_, FakeState>, ClientError> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.remove(&point) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

fn unprocessable(message: &str) -> ClientError {
    ClientError::Status {
        status: 422,
        message: message.to_string(),
    }
}

#[async_trait]
impl RepoClient for FakeRepoClient {
    async fn get_ref(&self, _repo: &RepoSlug, name: &str) -> Result<Lookup<GitRef>, ClientError> {
        let state = self.begin(ClientCall::GetRef { name: name.to_string() }, FailPoint::GetRef)?;
        Ok(match state.refs.get(name) {
            Some(sha) => Lookup::Found(GitRef {
                name: name.to_string(),
                sha: sha.clone(),
            }),
            None => Lookup::NotFound,
        })
    }

    async fn create_ref(&self, _repo: &RepoSlug, name: &str, sha: &str) -> Result<GitRef, ClientError> {
        let call = ClientCall::CreateRef {
            name: name.to_string(),
            sha: sha.to_string(),
        };
        let mut state = self.begin(call, FailPoint::CreateRef)?;
        if state.refs.contains_key(name) {
            return Err(unprocessable("Reference already exists"));
        }
        state.refs.insert(name.to_string(), sha.to_string());
        Ok(GitRef {
            name: name.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn update_ref(
        &self,
        _repo: &RepoSlug,
        name: &str,
        sha: &str,
        force: bool,
    ) -> Result<GitRef, ClientError> {
        let call = ClientCall::UpdateRef {
            name: name.to_string(),
            sha: sha.to_string(),
            force,
        };
        let mut state = self.begin(call, FailPoint::UpdateRef)?;
        match state.refs.get_mut(name) {
            Some(current) => {
                *current = sha.to_string();
                Ok(GitRef {
                    name: name.to_string(),
                    sha: sha.to_string(),
                })
            }
            None => Err(unprocessable("Reference does not exist")),
        }
    }

    async fn delete_ref(&self, _repo: &RepoSlug, name: &str) -> Result<Lookup<()>, ClientError> {
        let call = ClientCall::DeleteRef { name: name.to_string() };
        let mut state = self.begin(call, FailPoint::DeleteRef)?;
        Ok(match state.refs.remove(name) {
            Some(_) => Lookup::Found(()),
            None => Lookup::NotFound,
        })
    }

    async fn get_content(
        &self,
        _repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Lookup<RemoteContent>, ClientError> {
        let call = ClientCall::GetContent {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        };
        let state = self.begin(call, FailPoint::GetContent)?;
        Ok(
            match state.files.get(&(git_ref.to_string(), path.to_string())) {
                Some(content) => Lookup::Found(RemoteContent {
                    sha: Self::token_for(content),
                    content: content.clone(),
                }),
                None => Lookup::NotFound,
            },
        )
    }

    async fn put_content(
        &self,
        _repo: &RepoSlug,
        write: &ContentWrite,
    ) -> Result<WrittenContent, ClientError> {
        let call = ClientCall::PutContent {
            path: write.path.clone(),
            branch: write.branch.clone(),
            expected_sha: write.expected_sha.clone(),
        };
        let mut state = self.begin(call, FailPoint::PutContent)?;
        let key = (write.branch.clone(), write.path.clone());
        let current = state.files.get(&key).map(|c| Self::token_for(c));
        match (&current, &write.expected_sha) {
            (Some(_), None) => return Err(unprocessable("\"sha\" wasn't supplied.")),
            (Some(current), Some(expected)) if current != expected => {
                return Err(ClientError::Conflict(format!(
                    "{} does not match {expected}",
                    write.path
                )))
            }
            (None, Some(expected)) => {
                return Err(ClientError::Conflict(format!(
                    "{} does not match {expected}",
                    write.path
                )))
            }
            _ => {}
        }
        state.files.insert(key, write.content.clone());
        state.commit_counter += 1;
        Ok(WrittenContent {
            content_sha: Self::token_for(&write.content),
            commit_sha: format!("fake-commit-{}", state.commit_counter),
        })
    }

    async fn delete_content(
        &self,
        _repo: &RepoSlug,
        delete: &ContentDelete,
    ) -> Result<Lookup<()>, ClientError> {
        let call = ClientCall::DeleteContent {
            path: delete.path.clone(),
            branch: delete.branch.clone(),
            sha: delete.sha.clone(),
        };
        let mut state = self.begin(call, FailPoint::DeleteContent)?;
        let key = (delete.branch.clone(), delete.path.clone());
        let Some(current) = state.files.get(&key).map(|c| Self::token_for(c)) else {
            return Ok(Lookup::NotFound);
        };
        if current != delete.sha {
            return Err(ClientError::Conflict(format!(
                "{} does not match {}",
                delete.path, delete.sha
            )));
        }
        state.files.remove(&key);
        Ok(Lookup::Found(()))
    }

    async fn get_commit(&self, _repo: &RepoSlug, sha: &str) -> Result<Lookup<CommitInfo>, ClientError> {
        let state = self.begin(ClientCall::GetCommit { sha: sha.to_string() }, FailPoint::GetCommit)?;
        Ok(match state.commits.get(sha) {
            Some(info) => Lookup::Found(info.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn get_repository(&self, repo: &RepoSlug) -> Result<Lookup<RepositoryInfo>, ClientError> {
        let call = ClientCall::GetRepository { repo: repo.clone() };
        let state = self.begin(call, FailPoint::GetRepository)?;
        Ok(Lookup::Found(RepositoryInfo {
            default_branch: state.default_branch.clone(),
        }))
    }
}
