//! `delayed-job transform` — inject the scheduling variables locally.
//!
//! Useful for checking what a template will look like once scheduled; the
//! remote is never contacted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use delayed_core::{
    config::{parse_name_list, DEFAULT_WORKFLOWS_DIR},
    transform, JobPolicy, ProcessEnv, SchedulingParameters,
};
use delayed_publish::orchestrator::derive_file_name;

/// Arguments for `delayed-job transform`.
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Template workflow to transform.
    pub template: PathBuf,

    /// Ref the scheduled job checks out.
    #[arg(long = "ref", default_value = "HEAD")]
    pub checkout_ref: String,

    /// Treat `--ref` as a tag.
    #[arg(long)]
    pub tag: bool,

    /// Path recorded as the scheduled file's location; derived from the
    /// template name and ref when omitted.
    #[arg(long)]
    pub target_path: Option<String>,

    #[arg(long, default_value = "main")]
    pub unschedule_branch: String,

    #[arg(long)]
    pub payload: Option<String>,

    /// Variables to copy from this environment, comma or space separated.
    #[arg(long)]
    pub copy_env: Option<String>,

    /// Require the template to contain exactly one job.
    #[arg(long)]
    pub single_job: bool,

    /// Write the result here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl TransformArgs {
    pub fn run(self) -> Result<()> {
        let text = std::fs::read_to_string(&self.template)
            .with_context(|| format!("could not read template {}", self.template.display()))?;

        let new_file_path = self.target_path.clone().unwrap_or_else(|| {
            format!(
                "{DEFAULT_WORKFLOWS_DIR}/{}",
                derive_file_name(&self.template, &self.checkout_ref)
            )
        });
        let params = SchedulingParameters {
            checkout_ref: self.checkout_ref.clone(),
            is_tag: self.tag,
            new_file_path,
            unschedule_target_branch: self.unschedule_branch.clone(),
            job_payload: self.payload.clone(),
            copy_env_variables: self
                .copy_env
                .as_deref()
                .map(parse_name_list)
                .unwrap_or_default(),
            job_policy: if self.single_job {
                JobPolicy::SingleJob
            } else {
                JobPolicy::AllJobs
            },
        };

        let out = transform(&text, &params, &ProcessEnv)
            .with_context(|| format!("could not transform {}", self.template.display()))?;

        match &self.output {
            Some(path) => std::fs::write(path, out)
                .with_context(|| format!("could not write {}", path.display()))?,
            None => print!("{out}"),
        }
        Ok(())
    }
}
