//! Cleanup run from inside a scheduled job.
//!
//! The scheduled copy carries its own location in the `DELAYED_JOB_*`
//! variables; this removes that file and, optionally, the tag it checked out.

use delayed_core::{
    config::{optional, require, GITHUB_REPOSITORY},
    types::{
        ENV_CHECKOUT_REF, ENV_CHECKOUT_REF_IS_TAG, ENV_UNSCHEDULE_TARGET_BRANCH,
        ENV_WORKFLOW_FILE_PATH,
    },
    CommitIdentity, EnvSource, RepoSlug,
};

use crate::client::{Lookup, RepoClient};
use crate::error::PublishError;
use crate::remote_file::{RemoteFileSync, RemoveOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnscheduleConfig {
    pub identity: CommitIdentity,
    /// Also delete the tag the job checked out, if it checked out a tag.
    pub delete_tag: bool,
    /// Repository holding the scheduled file; defaults to the current one.
    pub target_repository: Option<RepoSlug>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRemoval {
    Deleted { tag: String },
    AlreadyAbsent { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnscheduleOutcome {
    pub repository: RepoSlug,
    pub branch: String,
    pub file: RemoveOutcome,
    pub tag: Option<TagRemoval>,
}

pub struct Unscheduler<C: RepoClient> {
    client: C,
    config: UnscheduleConfig,
}

impl<C: RepoClient> Unscheduler<C> {
    pub fn new(client: C, config: UnscheduleConfig) -> Self {
        Self { client, config }
    }

    pub async fn run(&self, env: &impl EnvSource) -> Result<UnscheduleOutcome, PublishError> {
        let path = require(env, ENV_WORKFLOW_FILE_PATH)?;
        let branch = require(env, ENV_UNSCHEDULE_TARGET_BRANCH)?;
        let repository = match &self.config.target_repository {
            Some(repo) => repo.clone(),
            None => require(env, GITHUB_REPOSITORY)?.parse()?,
        };
        let checked_out_tag = optional(env, ENV_CHECKOUT_REF)
            .filter(|_| optional(env, ENV_CHECKOUT_REF_IS_TAG).as_deref() == Some("true"));

        let sync = RemoteFileSync::new(&self.client, &repository);
        let existing = sync.load_existing(&path, &branch).await?;
        let file_name = path.rsplit('/').next().unwrap_or(path.as_str());
        let file = sync
            .remove(
                &existing,
                &branch,
                &format!("Remove delayed {file_name} job"),
                &self.config.identity,
            )
            .await?;

        let tag = match checked_out_tag {
            Some(tag) if self.config.delete_tag => Some(self.delete_tag(&repository, tag).await?),
            _ => None,
        };

        Ok(UnscheduleOutcome {
            repository,
            branch,
            file,
            tag,
        })
    }

    async fn delete_tag(&self, repository: &RepoSlug, tag: String) -> Result<TagRemoval, PublishError> {
        let deleted = self
            .client
            .delete_ref(repository, &format!("tags/{tag}"))
            .await
            .map_err(|source| PublishError::RefMutation {
                tag: tag.clone(),
                source,
            })?;
        Ok(match deleted {
            Lookup::Found(()) => {
                tracing::info!(tag = %tag, "deleted tag");
                TagRemoval::Deleted { tag }
            }
            Lookup::NotFound => {
                tracing::info!(tag = %tag, "tag already absent");
                TagRemoval::AlreadyAbsent { tag }
            }
        })
    }
}
