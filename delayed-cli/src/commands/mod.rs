pub mod schedule;
pub mod transform;
pub mod unschedule;

use anyhow::{Context, Result};
use clap::Args;
use delayed_core::{
    config::{non_empty, optional, GITHUB_TOKEN},
    CommitIdentity, ConfigError, ProcessEnv,
};
use delayed_publish::{client::DEFAULT_API_URL, GitHubClient};

/// Connection and commit-identity options shared by remote commands.
#[derive(Args, Debug)]
pub struct RemoteArgs {
    /// API token; falls back to GITHUB_TOKEN.
    #[arg(long, env = "INPUT_GHTOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Base URL of the hosting API.
    #[arg(long, env = "GITHUB_API_URL")]
    pub api_url: Option<String>,

    /// Name used as commit author.
    #[arg(long, env = "INPUT_GITUSERNAME")]
    pub git_user_name: Option<String>,

    /// Email used as commit author.
    #[arg(long, env = "INPUT_GITUSEREMAIL")]
    pub git_user_email: Option<String>,
}

impl RemoteArgs {
    pub fn client(&self) -> Result<GitHubClient> {
        let token = self
            .token
            .clone()
            .and_then(non_empty)
            .or_else(|| optional(&ProcessEnv, GITHUB_TOKEN))
            .ok_or_else(|| ConfigError::MissingContext {
                name: GITHUB_TOKEN.to_string(),
            })?;
        let api_url = self
            .api_url
            .clone()
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Ok(GitHubClient::new(api_url, token))
    }

    pub fn identity(&self) -> CommitIdentity {
        let default = CommitIdentity::default();
        CommitIdentity {
            name: self.git_user_name.clone().and_then(non_empty).unwrap_or(default.name),
            email: self
                .git_user_email
                .clone()
                .and_then(non_empty)
                .unwrap_or(default.email),
        }
    }
}

/// Run `future` to completion on a single-threaded runtime.
pub fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
