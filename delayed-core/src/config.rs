//! Run configuration.
//!
//! Everything a run needs is collected once into [`PublishConfig`] (operator
//! choices) and [`RunContext`] (values provided by the CI environment) and
//! then passed by reference to the components that need it. Environment
//! access goes through [`EnvSource`] so tests never touch the real process
//! environment.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::types::{CommitIdentity, JobPolicy, RepoSlug};

pub const GITHUB_SHA: &str = "GITHUB_SHA";
pub const GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const GITHUB_WORKSPACE: &str = "GITHUB_WORKSPACE";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";

/// Default directory scheduled workflow files are written to.
pub const DEFAULT_WORKFLOWS_DIR: &str = ".github/workflows";

/// Login of the account GitHub uses for commits made with the workflow token.
pub const DEFAULT_SERVICE_LOGIN: &str = "github-actions[bot]";

// ---------------------------------------------------------------------------
// Environment access
// ---------------------------------------------------------------------------

/// Read-only view of named string variables.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<E: EnvSource + ?Sized> EnvSource for &E {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}

/// Look up `name`, treating unset and empty the same way.
pub fn optional(env: &impl EnvSource, name: &str) -> Option<String> {
    env.var(name).and_then(non_empty)
}

/// Look up a required variable or fail with [`ConfigError::MissingContext`].
pub fn require(env: &impl EnvSource, name: &str) -> Result<String, ConfigError> {
    optional(env, name).ok_or_else(|| ConfigError::MissingContext {
        name: name.to_string(),
    })
}

/// `Some(value)` unless the value is blank. CI runners pass unset optional
/// inputs as empty strings.
pub fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Split a list of variable names separated by commas and/or whitespace.
pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Values supplied by the CI runner for the current invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Commit the workflow is running on.
    pub sha: String,
    /// Repository the workflow is running in.
    pub repository: RepoSlug,
    /// Checkout directory; relative template paths resolve against it.
    pub workspace: PathBuf,
}

impl RunContext {
    /// Validate and collect the required context values. Fails on the first
    /// missing one, in the order `GITHUB_SHA`, `GITHUB_REPOSITORY`.
    pub fn from_env(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let sha = require(env, GITHUB_SHA)?;
        let repository = require(env, GITHUB_REPOSITORY)?.parse()?;
        let workspace = optional(env, GITHUB_WORKSPACE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            sha,
            repository,
            workspace,
        })
    }
}

// ---------------------------------------------------------------------------
// Publish configuration
// ---------------------------------------------------------------------------

/// Operator-provided settings for a `schedule` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    /// Template workflow; relative paths resolve against the workspace.
    pub template_file: PathBuf,
    pub workflows_dir: String,
    /// Explicit target file name; derived from the template name when unset.
    pub target_file_name: Option<String>,
    /// Repository to publish into; defaults to the current repository.
    pub target_repository: Option<RepoSlug>,
    /// Branch to publish into; defaults to the target's default branch.
    pub target_branch: Option<String>,
    pub override_target_file: bool,
    /// Tag to create or move to the current commit before publishing.
    pub add_tag: Option<String>,
    /// Branch the scheduled job removes itself from; defaults to the target branch.
    pub unschedule_target_branch: Option<String>,
    pub job_payload: Option<String>,
    pub copy_env_variables: Vec<String>,
    pub job_policy: JobPolicy,
    pub identity: CommitIdentity,
    pub service_login: String,
    /// Compute and report the change without mutating the remote.
    pub dry_run: bool,
}

impl PublishConfig {
    pub fn new(template_file: impl Into<PathBuf>) -> Self {
        Self {
            template_file: template_file.into(),
            workflows_dir: DEFAULT_WORKFLOWS_DIR.to_string(),
            target_file_name: None,
            target_repository: None,
            target_branch: None,
            override_target_file: false,
            add_tag: None,
            unschedule_target_branch: None,
            job_payload: None,
            copy_env_variables: vec![],
            job_policy: JobPolicy::default(),
            identity: CommitIdentity::default(),
            service_login: DEFAULT_SERVICE_LOGIN.to_string(),
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
