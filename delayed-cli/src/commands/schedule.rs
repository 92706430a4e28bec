//! `delayed-job schedule` — publish a delayed copy of a workflow.

use anyhow::{bail, Context, Result};
use clap::{builder::FalseyValueParser, Args};
use colored::Colorize;
use delayed_core::{
    config::{non_empty, parse_name_list, DEFAULT_WORKFLOWS_DIR},
    JobPolicy, ProcessEnv, PublishConfig, RepoSlug,
};
use delayed_publish::{PublishOrchestrator, PublishResult, RunOutcome, WriteOutcome};

use super::{block_on, RemoteArgs};
use crate::outputs;

/// Arguments for `delayed-job schedule`.
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Template workflow, relative to the workspace.
    #[arg(long = "template", env = "INPUT_TEMPLATEYMLFILE")]
    pub template_yml_file: String,

    /// Replace the target file if it already exists.
    #[arg(long, env = "INPUT_OVERRIDETARGETFILE", value_parser = FalseyValueParser::new())]
    pub override_target_file: bool,

    /// Target file name; defaults to `<template>-<ref>.yml`.
    #[arg(long = "target-file-name", env = "INPUT_TARGETYMLFILENAME")]
    pub target_yml_file_name: Option<String>,

    /// Branch to publish into; defaults to the repository's default branch.
    #[arg(long, env = "INPUT_TARGETBRANCH")]
    pub target_branch: Option<String>,

    /// `owner/repo` to publish into; defaults to the current repository.
    #[arg(long, env = "INPUT_TARGETREPOSITORY")]
    pub target_repository: Option<String>,

    /// Create or move this tag to the current commit and check it out later.
    #[arg(long, env = "INPUT_ADDTAG")]
    pub add_tag: Option<String>,

    /// Branch the scheduled job removes itself from.
    #[arg(long, env = "INPUT_UNSCHEDULETARGETBRANCH")]
    pub unschedule_target_branch: Option<String>,

    /// Opaque value passed to the scheduled job as DELAYED_JOB_PAYLOAD.
    #[arg(long, env = "INPUT_JOBPAYLOAD")]
    pub job_payload: Option<String>,

    /// Variables to copy from this environment into every job.
    #[arg(long, env = "INPUT_COPYENVVARIABLES")]
    pub copy_env_variables: Option<String>,

    #[arg(long, default_value = DEFAULT_WORKFLOWS_DIR)]
    pub workflows_dir: String,

    /// Require the template to contain exactly one job.
    #[arg(long)]
    pub single_job: bool,

    /// Show the diff that would be published without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

impl ScheduleArgs {
    pub fn run(self) -> Result<()> {
        let config = self.publish_config()?;
        let client = self.remote.client()?;
        let orchestrator = PublishOrchestrator::new(client, config);

        let outcome = block_on(orchestrator.run(&ProcessEnv))?.context("schedule failed")?;
        match outcome {
            RunOutcome::SelfTriggered { sha } => {
                println!("{} commit {sha} was made by delayed-job; nothing to do", "·".dimmed());
            }
            RunOutcome::Preview { result, diff } => {
                println!(
                    "[dry-run] {} {}@{}",
                    "~".yellow(),
                    result.target_file_path,
                    result.branch
                );
                match diff {
                    Some(diff) => print!("{diff}"),
                    None => println!("  ·  no changes"),
                }
            }
            RunOutcome::Published { result, write } => {
                print_published(&result, &write);
                outputs::emit(&[
                    ("targetFileName", result.target_file_name.clone()),
                    (
                        "targetFilePath",
                        result.absolute_file_path.display().to_string(),
                    ),
                ])?;
            }
        }
        Ok(())
    }

    fn publish_config(&self) -> Result<PublishConfig> {
        let Some(template) = non_empty(self.template_yml_file.clone()) else {
            bail!("a template file is required");
        };

        let mut config = PublishConfig::new(template);
        config.workflows_dir = self.workflows_dir.clone();
        config.target_file_name = self.target_yml_file_name.clone().and_then(non_empty);
        config.target_branch = self.target_branch.clone().and_then(non_empty);
        config.target_repository = self
            .target_repository
            .clone()
            .and_then(non_empty)
            .map(|repo| repo.parse::<RepoSlug>())
            .transpose()
            .context("invalid target repository")?;
        config.override_target_file = self.override_target_file;
        config.add_tag = self.add_tag.clone().and_then(non_empty);
        config.unschedule_target_branch = self.unschedule_target_branch.clone().and_then(non_empty);
        config.job_payload = self.job_payload.clone().and_then(non_empty);
        config.copy_env_variables = self
            .copy_env_variables
            .as_deref()
            .map(parse_name_list)
            .unwrap_or_default();
        config.job_policy = if self.single_job {
            JobPolicy::SingleJob
        } else {
            JobPolicy::AllJobs
        };
        config.identity = self.remote.identity();
        config.dry_run = self.dry_run;
        Ok(config)
    }
}

fn print_published(result: &PublishResult, write: &WriteOutcome) {
    let tag = result
        .tag
        .as_deref()
        .map(|t| format!(" (tag {t})"))
        .unwrap_or_default();
    match write {
        WriteOutcome::Written { commit_sha, .. } => println!(
            "{} scheduled {} in {}@{}{tag} [{}]",
            "✓".green(),
            result.target_file_path,
            result.repository,
            result.branch,
            commit_sha
        ),
        WriteOutcome::Unchanged { .. } => println!(
            "{} {} in {}@{} is already up to date{tag}",
            "·".dimmed(),
            result.target_file_path,
            result.repository,
            result.branch
        ),
    }
}
