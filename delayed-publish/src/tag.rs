//! Tag create-or-update with a compensating rollback.
//!
//! The coordinator remembers what the tag pointed at before it was touched so
//! that a failed publish can put it back:
//!
//! ```text
//! Unknown ──load──▶ Snapshotted ──create_or_update──▶ Mutated ──▶ Committed
//!                                                        └──────▶ RolledBack
//! ```
//!
//! A call the remote definitely rejected leaves the coordinator in
//! `Snapshotted`; only a success or a transport failure, where the remote may
//! have applied the change, moves it to `Mutated`.

use delayed_core::RepoSlug;

use crate::client::{ClientError, Lookup, RepoClient};
use crate::error::{read_err, PublishError};

/// Where the tag pointed before this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagState {
    Absent,
    PointsAt(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSnapshot {
    pub tag_name: String,
    pub target: RepoSlug,
    /// `None` until [`RefTagCoordinator::load_existing`] has read the remote.
    pub prior_state: Option<TagState>,
}

/// Result of [`RefTagCoordinator::rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// No mutation happened, or it was committed.
    NothingToUndo,
    /// The tag was moved back to its prior commit.
    Restored { sha: String },
    /// The tag did not exist before and was deleted.
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unknown,
    Snapshotted,
    Mutated,
    Committed,
    RolledBack,
}

pub struct RefTagCoordinator<'a, C: RepoClient + ?Sized> {
    client: &'a C,
    snapshot: TagSnapshot,
    phase: Phase,
}

impl<'a, C: RepoClient + ?Sized> RefTagCoordinator<'a, C> {
    pub fn new(client: &'a C, target: RepoSlug, tag_name: impl Into<String>) -> Self {
        Self {
            client,
            snapshot: TagSnapshot {
                tag_name: tag_name.into(),
                target,
                prior_state: None,
            },
            phase: Phase::Unknown,
        }
    }

    fn ref_name(&self) -> String {
        format!("tags/{}", self.snapshot.tag_name)
    }

    /// Read the current tag target. Only the first call hits the remote.
    pub async fn load_existing(&mut self) -> Result<&TagState, PublishError> {
        let name = self.ref_name();
        let state = match self.snapshot.prior_state.take() {
            Some(state) => state,
            None => {
                let lookup = self
                    .client
                    .get_ref(&self.snapshot.target, &name)
                    .await
                    .map_err(|e| read_err(format!("ref {name} in {}", self.snapshot.target), e))?;
                let state = match lookup {
                    Lookup::Found(git_ref) => TagState::PointsAt(git_ref.sha),
                    Lookup::NotFound => TagState::Absent,
                };
                self.phase = Phase::Snapshotted;
                tracing::debug!(tag = %self.snapshot.tag_name, prior = ?state, "tag snapshot");
                state
            }
        };
        Ok(self.snapshot.prior_state.insert(state))
    }

    /// Point the tag at `sha`, creating it if it does not exist.
    pub async fn create_or_update(&mut self, sha: &str) -> Result<(), PublishError> {
        let prior = self.load_existing().await?.clone();
        let name = self.ref_name();
        let target = &self.snapshot.target;

        let result = match &prior {
            TagState::Absent => {
                tracing::info!(tag = %self.snapshot.tag_name, sha, "creating tag");
                self.client.create_ref(target, &name, sha).await
            }
            TagState::PointsAt(prior) => {
                tracing::info!(tag = %self.snapshot.tag_name, from = %prior, to = sha, "moving tag");
                self.client.update_ref(target, &name, sha, true).await
            }
        };
        match result {
            Ok(_) => {
                self.phase = Phase::Mutated;
                Ok(())
            }
            Err(source) => {
                // A dropped connection may still have reached the remote.
                if matches!(source, ClientError::Transport(_)) {
                    self.phase = Phase::Mutated;
                }
                Err(PublishError::RefMutation {
                    tag: self.snapshot.tag_name.clone(),
                    source,
                })
            }
        }
    }

    /// Undo [`create_or_update`](Self::create_or_update). A no-op unless a
    /// mutation may have reached the remote and was not committed.
    pub async fn rollback(&mut self) -> Result<RollbackOutcome, PublishError> {
        if self.phase != Phase::Mutated {
            return Ok(RollbackOutcome::NothingToUndo);
        }
        let Some(prior_state) = &self.snapshot.prior_state else {
            return Ok(RollbackOutcome::NothingToUndo);
        };
        let name = self.ref_name();
        let target = &self.snapshot.target;
        let tag = self.snapshot.tag_name.clone();
        let mutation_err = |source: ClientError| PublishError::RefMutation {
            tag: tag.clone(),
            source,
        };

        let outcome = match prior_state {
            TagState::PointsAt(prior) => {
                self.client
                    .update_ref(target, &name, prior, true)
                    .await
                    .map_err(mutation_err)?;
                tracing::warn!(tag = %tag, sha = %prior, "tag restored");
                RollbackOutcome::Restored { sha: prior.clone() }
            }
            TagState::Absent => {
                // Already gone is as good as deleted.
                self.client
                    .delete_ref(target, &name)
                    .await
                    .map_err(mutation_err)?;
                tracing::warn!(tag = %tag, "tag deleted");
                RollbackOutcome::Deleted
            }
        };
        self.phase = Phase::RolledBack;
        Ok(outcome)
    }

    /// Make the mutation final.
    pub fn commit(&mut self) {
        if self.phase == Phase::Mutated {
            self.phase = Phase::Committed;
        }
    }

    pub fn snapshot(&self) -> &TagSnapshot {
        &self.snapshot
    }

    pub fn tag_name(&self) -> &str {
        &self.snapshot.tag_name
    }
}
