//! Domain types shared by the transformer, the loop guard and the publisher.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Injected variable names
// ---------------------------------------------------------------------------

pub const ENV_CHECKOUT_REF: &str = "DELAYED_JOB_CHECKOUT_REF";
pub const ENV_CHECKOUT_REF_IS_TAG: &str = "DELAYED_JOB_CHECKOUT_REF_IS_TAG";
pub const ENV_WORKFLOW_FILE_PATH: &str = "DELAYED_JOB_WORKFLOW_FILE_PATH";
pub const ENV_UNSCHEDULE_TARGET_BRANCH: &str = "DELAYED_JOB_WORKFLOW_UNSCHEDULE_TARGET_BRANCH";
pub const ENV_PAYLOAD: &str = "DELAYED_JOB_PAYLOAD";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An `owner/repo` pair identifying a repository on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoSlug {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRepository {
            value: s.to_owned(),
        };
        let (owner, repo) = s.trim().split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(invalid());
        }
        Ok(Self::new(owner, repo))
    }
}

// ---------------------------------------------------------------------------
// Commit metadata
// ---------------------------------------------------------------------------

/// Name/email pair written as the author of every commit this tool makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "github-actions[bot]".to_string(),
            email: "41898282+github-actions[bot]@users.noreply.github.com".to_string(),
        }
    }
}

impl fmt::Display for CommitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Author block of an existing commit, as reported by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

// ---------------------------------------------------------------------------
// Scheduling parameters
// ---------------------------------------------------------------------------

/// Which jobs of a document receive the injected variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPolicy {
    /// Every job in the document is updated.
    #[default]
    AllJobs,
    /// Exactly one job is required; more than one is rejected.
    SingleJob,
}

/// Everything the transformer needs to know about the scheduled copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingParameters {
    /// Commit SHA or tag name the delayed job checks out.
    pub checkout_ref: String,
    pub is_tag: bool,
    /// Repository-relative path the scheduled copy is written to.
    pub new_file_path: String,
    pub unschedule_target_branch: String,
    pub job_payload: Option<String>,
    /// Names of variables to snapshot from the invoking environment, in order.
    pub copy_env_variables: Vec<String>,
    pub job_policy: JobPolicy,
}

impl SchedulingParameters {
    /// The fixed `DELAYED_JOB_*` pairs injected into every job, in injection order.
    pub fn injected_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            (ENV_CHECKOUT_REF, self.checkout_ref.clone()),
            (ENV_CHECKOUT_REF_IS_TAG, self.is_tag.to_string()),
            (ENV_WORKFLOW_FILE_PATH, self.new_file_path.clone()),
            (
                ENV_UNSCHEDULE_TARGET_BRANCH,
                self.unschedule_target_branch.clone(),
            ),
        ];
        if let Some(payload) = &self.job_payload {
            vars.push((ENV_PAYLOAD, payload.clone()));
        }
        vars
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
