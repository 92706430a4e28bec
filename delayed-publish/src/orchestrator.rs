//! End-to-end `schedule` run.
//!
//! 1. Validate the run context.
//! 2. Stop if the current commit was made by this tool.
//! 3. Read the template from the workspace.
//! 4. Derive the target file name and path.
//! 5. Resolve the target branch.
//! 6. Read the target file and check the overwrite policy.
//! 7. Transform the template.
//! 8. Create or move the tag, if requested.
//! 9. Publish the file; roll the tag back if that fails.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use delayed_core::{
    config::RunContext, transform, EnvSource, LoopGuard, PublishConfig, RepoSlug,
    SchedulingParameters,
};

use crate::client::{ClientError, Lookup, RepoClient};
use crate::diff::unified_diff;
use crate::error::{io_err, read_err, PublishError};
use crate::remote_file::{ensure_overwrite_allowed, FileWrite, RemoteFileSync, WriteOutcome};
use crate::tag::RefTagCoordinator;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Where the scheduled workflow went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub target_file_name: String,
    /// Path inside the target repository.
    pub target_file_path: String,
    /// `target_file_path` joined onto the absolute local workspace.
    pub absolute_file_path: PathBuf,
    pub repository: RepoSlug,
    pub branch: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The current commit was made by this tool; nothing was done.
    SelfTriggered { sha: String },
    Published {
        result: PublishResult,
        write: WriteOutcome,
    },
    /// Dry run: what would be published. `diff` is `None` if nothing would change.
    Preview {
        result: PublishResult,
        diff: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct PublishOrchestrator<C: RepoClient> {
    client: C,
    config: PublishConfig,
}

impl<C: RepoClient> PublishOrchestrator<C> {
    pub fn new(client: C, config: PublishConfig) -> Self {
        Self { client, config }
    }

    pub async fn run(&self, env: &impl EnvSource) -> Result<RunOutcome, PublishError> {
        let config = &self.config;
        let ctx = RunContext::from_env(env)?;

        if self.is_self_triggered(&ctx).await? {
            tracing::info!(sha = %ctx.sha, "commit was made by this tool; skipping");
            return Ok(RunOutcome::SelfTriggered { sha: ctx.sha });
        }

        let workspace = absolute_workspace(&ctx.workspace)?;
        let template_path = resolve(&workspace, &config.template_file);
        let template = read_template(&template_path).await?;

        let checkout_ref = config.add_tag.clone().unwrap_or_else(|| ctx.sha.clone());
        let target_file_name = match &config.target_file_name {
            Some(name) => name.clone(),
            None => derive_file_name(&config.template_file, &checkout_ref),
        };
        let target_file_path = format!(
            "{}/{}",
            config.workflows_dir.trim_end_matches('/'),
            target_file_name
        );

        let repository = config
            .target_repository
            .clone()
            .unwrap_or_else(|| ctx.repository.clone());
        let branch = match &config.target_branch {
            Some(branch) => branch.clone(),
            None => self.default_branch(&repository).await?,
        };
        tracing::info!(
            repository = %repository,
            branch = %branch,
            path = %target_file_path,
            "publishing target"
        );

        let sync = RemoteFileSync::new(&self.client, &repository);
        let existing = sync.load_existing(&target_file_path, &branch).await?;
        ensure_overwrite_allowed(&existing, config.override_target_file)?;

        let params = SchedulingParameters {
            checkout_ref,
            is_tag: config.add_tag.is_some(),
            new_file_path: target_file_path.clone(),
            unschedule_target_branch: config
                .unschedule_target_branch
                .clone()
                .unwrap_or_else(|| branch.clone()),
            job_payload: config.job_payload.clone(),
            copy_env_variables: config.copy_env_variables.clone(),
            job_policy: config.job_policy,
        };
        let content = transform(&template, &params, env)?;

        let result = PublishResult {
            absolute_file_path: workspace.join(&target_file_path),
            target_file_name,
            target_file_path,
            repository: repository.clone(),
            branch,
            tag: config.add_tag.clone(),
        };

        if config.dry_run {
            let diff = unified_diff(&result.target_file_path, &existing.text(), &content);
            tracing::info!(path = %result.target_file_path, changed = diff.is_some(), "[dry-run] not publishing");
            return Ok(RunOutcome::Preview { result, diff });
        }

        let mut tag = config
            .add_tag
            .as_ref()
            .map(|name| RefTagCoordinator::new(&self.client, result.repository.clone(), name.clone()));

        let write = FileWrite {
            path: result.target_file_path.clone(),
            branch: result.branch.clone(),
            content: content.into_bytes(),
            identity: config.identity.clone(),
            message: format!("Add delayed {} job", result.target_file_name),
        };
        let published = async {
            if let Some(tag) = tag.as_mut() {
                tag.create_or_update(&ctx.sha).await?;
            }
            sync.publish(&existing, write, config.override_target_file).await
        }
        .await;

        match published {
            Ok(write) => {
                if let Some(tag) = tag.as_mut() {
                    tag.commit();
                }
                Ok(RunOutcome::Published { result, write })
            }
            Err(err) => {
                if let Some(tag) = tag.as_mut() {
                    match tag.rollback().await {
                        Ok(outcome) => tracing::warn!(tag = tag.tag_name(), ?outcome, "rolled back tag"),
                        Err(rollback_err) => tracing::error!(
                            tag = tag.tag_name(),
                            error = %rollback_err,
                            "tag rollback failed; the tag may need manual repair"
                        ),
                    }
                }
                Err(err)
            }
        }
    }

    async fn is_self_triggered(&self, ctx: &RunContext) -> Result<bool, PublishError> {
        let what = || format!("commit {} in {}", ctx.sha, ctx.repository);
        let commit = match self.client.get_commit(&ctx.repository, &ctx.sha).await {
            Ok(Lookup::Found(commit)) => commit,
            Ok(Lookup::NotFound) => return Err(read_err(what(), not_found())),
            Err(err) => return Err(read_err(what(), err)),
        };
        let guard = LoopGuard::new(self.config.identity.clone(), self.config.service_login.clone());
        Ok(guard.is_self_triggered(&commit.author, commit.committer_login.as_deref()))
    }

    async fn default_branch(&self, repository: &RepoSlug) -> Result<String, PublishError> {
        let what = || format!("repository {repository}");
        match self.client.get_repository(repository).await {
            Ok(Lookup::Found(info)) => Ok(info.default_branch),
            Ok(Lookup::NotFound) => Err(read_err(what(), not_found())),
            Err(err) => Err(read_err(what(), err)),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found() -> ClientError {
    ClientError::Status {
        status: 404,
        message: "Not Found".to_string(),
    }
}

/// The workspace as an absolute path; a relative one is taken from the
/// current directory.
fn absolute_workspace(workspace: &Path) -> Result<PathBuf, PublishError> {
    if workspace.is_absolute() {
        return Ok(workspace.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| io_err(workspace, e))?;
    if workspace == Path::new(".") {
        Ok(cwd)
    } else {
        Ok(cwd.join(workspace))
    }
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

async fn read_template(path: &Path) -> Result<String, PublishError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(PublishError::TemplateNotFound {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(io_err(path, err)),
    }
}

/// `<template stem>-<checkout ref>.yml`, with `/` in the ref replaced by `-`.
pub fn derive_file_name(template: &Path, checkout_ref: &str) -> String {
    if template.extension().and_then(|e| e.to_str()) != Some("yml") {
        tracing::warn!(
            template = %template.display(),
            "template does not have a .yml extension; the target will still be written as .yml"
        );
    }
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}-{}.yml", checkout_ref.replace('/', "-"))
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
