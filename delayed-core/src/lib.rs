//! Delayed-job core library — domain types, configuration, document
//! transformation and the self-trigger guard. No network I/O.
//!
//! - [`types`] — scheduling parameters, identities, repository slugs
//! - [`config`] — [`PublishConfig`], [`RunContext`], environment access
//! - [`transform`] — `DELAYED_JOB_*` injection into workflow documents
//! - [`loop_guard`] — [`LoopGuard`]
//! - [`error`] — [`ConfigError`], [`TransformError`]

pub mod config;
pub mod error;
pub mod loop_guard;
pub mod transform;
pub mod types;

pub use config::{EnvSource, ProcessEnv, PublishConfig, RunContext};
pub use error::{ConfigError, TransformError};
pub use loop_guard::LoopGuard;
pub use transform::{transform, JobDefinitionDocument};
pub use types::{
    CommitAuthor, CommitIdentity, JobPolicy, RepoSlug, SchedulingParameters,
};
