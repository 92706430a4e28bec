//! `delayed-job unschedule` — remove the scheduled copy this job runs from.

use anyhow::{Context, Result};
use clap::{builder::FalseyValueParser, Args};
use colored::Colorize;
use delayed_core::{config::non_empty, ProcessEnv, RepoSlug};
use delayed_publish::{RemoveOutcome, TagRemoval, UnscheduleConfig, Unscheduler};

use super::{block_on, RemoteArgs};

/// Arguments for `delayed-job unschedule`.
#[derive(Args, Debug)]
pub struct UnscheduleArgs {
    /// Also delete the tag the job checked out.
    #[arg(long, env = "INPUT_DELETETAG", value_parser = FalseyValueParser::new())]
    pub delete_tag: bool,

    /// `owner/repo` holding the scheduled file; defaults to the current repository.
    #[arg(long, env = "INPUT_TARGETREPOSITORY")]
    pub target_repository: Option<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

impl UnscheduleArgs {
    pub fn run(self) -> Result<()> {
        let target_repository = self
            .target_repository
            .clone()
            .and_then(non_empty)
            .map(|repo| repo.parse::<RepoSlug>())
            .transpose()
            .context("invalid target repository")?;
        let config = UnscheduleConfig {
            identity: self.remote.identity(),
            delete_tag: self.delete_tag,
            target_repository,
        };
        let unscheduler = Unscheduler::new(self.remote.client()?, config);

        let outcome = block_on(unscheduler.run(&ProcessEnv))?.context("unschedule failed")?;
        match &outcome.file {
            RemoveOutcome::Removed { path } => println!(
                "{} removed {path} from {}@{}",
                "✓".green(),
                outcome.repository,
                outcome.branch
            ),
            RemoveOutcome::AlreadyRemoved { path } => println!(
                "{} {path} was already gone from {}@{}",
                "·".dimmed(),
                outcome.repository,
                outcome.branch
            ),
        }
        match &outcome.tag {
            Some(TagRemoval::Deleted { tag }) => println!("  ✎  deleted tag {tag}"),
            Some(TagRemoval::AlreadyAbsent { tag }) => println!("  ·  tag {tag} already absent"),
            None => {}
        }
        Ok(())
    }
}
