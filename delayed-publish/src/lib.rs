//! # delayed-publish
//!
//! Publishes a transformed workflow into a repository through the hosting
//! API, with an optional tag that is rolled back if the publish fails.
//!
//! Call [`PublishOrchestrator::run`] for a full `schedule` run or
//! [`Unscheduler::run`] from inside a scheduled job to clean it up.

pub mod client;
pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod remote_file;
pub mod tag;
pub mod unschedule;

pub use client::{ClientError, GitHubClient, Lookup, RepoClient};
pub use error::PublishError;
pub use orchestrator::{PublishOrchestrator, PublishResult, RunOutcome};
pub use remote_file::{RemoteFileState, RemoteFileSync, RemoveOutcome, WriteOutcome};
pub use tag::{RefTagCoordinator, RollbackOutcome, TagSnapshot, TagState};
pub use unschedule::{TagRemoval, UnscheduleConfig, UnscheduleOutcome, Unscheduler};
