//! GitHub REST v3 implementation of [`RepoClient`].
//!
//! Requests go through a blocking `ureq` agent on tokio's blocking pool, one
//! at a time. A 404 on a read maps to [`Lookup::NotFound`]; 409 maps to
//! [`ClientError::Conflict`]. Timeouts are the agent's; there is no retry.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};

use delayed_core::{CommitAuthor, CommitIdentity, RepoSlug};

use super::{
    ClientError, CommitInfo, ContentDelete, ContentWrite, GitRef, Lookup, RemoteContent,
    RepoClient, RepositoryInfo, WrittenContent,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Client struct
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GitHubClient {
    agent: ureq::Agent,
    api_url: String,
    token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("delayed-job/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn send(
        &self,
        method: &'static str,
        path: String,
        query: Option<(&'static str, String)>,
        body: Option<Value>,
    ) -> Result<Lookup<Value>, ClientError> {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.api_url, path);
        let auth = format!("Bearer {}", self.token);

        tracing::debug!(method, %url, "GitHub API request");
        tokio::task::spawn_blocking(move || {
            let mut request = agent
                .request(method, &url)
                .set("Authorization", &auth)
                .set("Accept", ACCEPT)
                .set("X-GitHub-Api-Version", API_VERSION);
            if let Some((key, value)) = &query {
                request = request.query(key, value);
            }
            let response = match body {
                Some(body) => request.send_json(body),
                None => request.call(),
            };
            match response {
                Ok(response) => read_json(response).map(Lookup::Found),
                Err(ureq::Error::Status(404, _)) => Ok(Lookup::NotFound),
                Err(ureq::Error::Status(409, response)) => {
                    Err(ClientError::Conflict(error_message(response)))
                }
                Err(ureq::Error::Status(status, response)) => Err(ClientError::Status {
                    status,
                    message: error_message(response),
                }),
                Err(ureq::Error::Transport(transport)) => {
                    Err(ClientError::Transport(transport.to_string()))
                }
            }
        })
        .await
        .map_err(|e| ClientError::Transport(format!("request task failed: {e}")))?
    }

    /// Like [`send`](Self::send) for calls where 404 is a failure.
    async fn send_expecting(
        &self,
        method: &'static str,
        path: String,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        match self.send(method, path.clone(), None, body).await? {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound => Err(ClientError::Status {
                status: 404,
                message: format!("{method} {path}: not found"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl RepoClient for GitHubClient {
    async fn get_ref(&self, repo: &RepoSlug, name: &str) -> Result<Lookup<GitRef>, ClientError> {
        let path = format!("{}/git/ref/{}", repo_path(repo), encode_path(name));
        match self.send("GET", path, None, None).await? {
            Lookup::Found(body) => parse_ref(&body).map(Lookup::Found),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }

    async fn create_ref(&self, repo: &RepoSlug, name: &str, sha: &str) -> Result<GitRef, ClientError> {
        let path = format!("{}/git/refs", repo_path(repo));
        let body = json!({ "ref": format!("refs/{name}"), "sha": sha });
        parse_ref(&self.send_expecting("POST", path, Some(body)).await?)
    }

    async fn update_ref(
        &self,
        repo: &RepoSlug,
        name: &str,
        sha: &str,
        force: bool,
    ) -> Result<GitRef, ClientError> {
        let path = format!("{}/git/refs/{}", repo_path(repo), encode_path(name));
        let body = json!({ "sha": sha, "force": force });
        parse_ref(&self.send_expecting("PATCH", path, Some(body)).await?)
    }

    async fn delete_ref(&self, repo: &RepoSlug, name: &str) -> Result<Lookup<()>, ClientError> {
        let path = format!("{}/git/refs/{}", repo_path(repo), encode_path(name));
        Ok(self.send("DELETE", path, None, None).await?.map(|_| ()))
    }

    async fn get_content(
        &self,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Lookup<RemoteContent>, ClientError> {
        let url_path = format!("{}/contents/{}", repo_path(repo), encode_path(path));
        let query = Some(("ref", git_ref.to_string()));
        match self.send("GET", url_path, query, None).await? {
            Lookup::Found(body) => parse_content(&body).map(Lookup::Found),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }

    async fn put_content(
        &self,
        repo: &RepoSlug,
        write: &ContentWrite,
    ) -> Result<WrittenContent, ClientError> {
        let path = format!("{}/contents/{}", repo_path(repo), encode_path(&write.path));
        let body = put_content_body(write);
        parse_written(&self.send_expecting("PUT", path, Some(body)).await?)
    }

    async fn delete_content(
        &self,
        repo: &RepoSlug,
        delete: &ContentDelete,
    ) -> Result<Lookup<()>, ClientError> {
        let path = format!("{}/contents/{}", repo_path(repo), encode_path(&delete.path));
        let body = json!({
            "message": delete.message,
            "sha": delete.sha,
            "branch": delete.branch,
            "author": identity_json(&delete.author),
            "committer": identity_json(&delete.author),
        });
        Ok(self.send("DELETE", path, None, Some(body)).await?.map(|_| ()))
    }

    async fn get_commit(&self, repo: &RepoSlug, sha: &str) -> Result<Lookup<CommitInfo>, ClientError> {
        let path = format!("{}/commits/{}", repo_path(repo), encode_path(sha));
        match self.send("GET", path, None, None).await? {
            Lookup::Found(body) => parse_commit(&body).map(Lookup::Found),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }

    async fn get_repository(&self, repo: &RepoSlug) -> Result<Lookup<RepositoryInfo>, ClientError> {
        match self.send("GET", repo_path(repo), None, None).await? {
            Lookup::Found(body) => parse_repository(&body).map(Lookup::Found),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response helpers
// ---------------------------------------------------------------------------

fn repo_path(repo: &RepoSlug) -> String {
    format!("/repos/{}/{}", encode_path(&repo.owner), encode_path(&repo.repo))
}

/// Percent-encode everything except unreserved characters and `/`.
fn encode_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn identity_json(identity: &CommitIdentity) -> Value {
    json!({ "name": identity.name, "email": identity.email })
}

fn put_content_body(write: &ContentWrite) -> Value {
    let mut body = json!({
        "message": write.message,
        "content": base64::engine::general_purpose::STANDARD.encode(&write.content),
        "branch": write.branch,
        "author": identity_json(&write.author),
        "committer": identity_json(&write.author),
    });
    if let Some(sha) = &write.expected_sha {
        body["sha"] = Value::String(sha.clone());
    }
    body
}

fn read_json(response: ureq::Response) -> Result<Value, ClientError> {
    let text = response
        .into_string()
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
}

fn error_message(response: ureq::Response) -> String {
    let text = response.into_string().unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or(text)
}

fn str_field<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, ClientError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Decode(format!("missing field {pointer}")))
}

fn parse_ref(body: &Value) -> Result<GitRef, ClientError> {
    let full = str_field(body, "/ref")?;
    Ok(GitRef {
        name: full.strip_prefix("refs/").unwrap_or(full).to_string(),
        sha: str_field(body, "/object/sha")?.to_string(),
    })
}

fn parse_content(body: &Value) -> Result<RemoteContent, ClientError> {
    if body.is_array() {
        return Err(ClientError::Decode("path is a directory".to_string()));
    }
    let encoded: String = str_field(body, "/content")?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let content = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ClientError::Decode(format!("content is not base64: {e}")))?;
    Ok(RemoteContent {
        sha: str_field(body, "/sha")?.to_string(),
        content,
    })
}

fn parse_written(body: &Value) -> Result<WrittenContent, ClientError> {
    Ok(WrittenContent {
        content_sha: str_field(body, "/content/sha")?.to_string(),
        commit_sha: str_field(body, "/commit/sha")?.to_string(),
    })
}

fn parse_commit(body: &Value) -> Result<CommitInfo, ClientError> {
    Ok(CommitInfo {
        sha: str_field(body, "/sha")?.to_string(),
        author: CommitAuthor {
            name: str_field(body, "/commit/author/name")?.to_string(),
            email: str_field(body, "/commit/author/email")?.to_string(),
        },
        committer_login: body
            .pointer("/committer/login")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

fn parse_repository(body: &Value) -> Result<RepositoryInfo, ClientError> {
    Ok(RepositoryInfo {
        default_branch: str_field(body, "/default_branch")?.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
