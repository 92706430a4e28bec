//! Self-trigger detection.
//!
//! Publishing a scheduled workflow creates a commit on the target branch,
//! which can start the very workflow that published it. The guard recognises
//! commits made by this tool so such runs end quietly.

use crate::types::{CommitAuthor, CommitIdentity};

/// Decides whether a commit was produced by a previous run of this tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopGuard {
    identity: CommitIdentity,
    service_login: String,
}

impl LoopGuard {
    pub fn new(identity: CommitIdentity, service_login: impl Into<String>) -> Self {
        Self {
            identity,
            service_login: service_login.into(),
        }
    }

    /// True when the author matches the publishing identity exactly, or the
    /// committer account is the service account.
    pub fn is_self_triggered(&self, author: &CommitAuthor, committer_login: Option<&str>) -> bool {
        let same_author = author.name == self.identity.name && author.email == self.identity.email;
        let service_commit = committer_login.is_some_and(|login| login == self.service_login);
        if same_author || service_commit {
            tracing::debug!(
                author = %author.name,
                email = %author.email,
                committer = committer_login.unwrap_or("-"),
                "commit was produced by this tool"
            );
        }
        same_author || service_commit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> LoopGuard {
        LoopGuard::new(
            CommitIdentity {
                name: "scheduler-bot".to_string(),
                email: "bot@example.com".to_string(),
            },
            "github-actions[bot]",
        )
    }

    fn author(name: &str, email: &str) -> CommitAuthor {
        CommitAuthor {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn matching_identity_is_self_triggered() {
        assert!(guard().is_self_triggered(&author("scheduler-bot", "bot@example.com"), None));
    }

    #[test]
    fn service_login_is_self_triggered() {
        assert!(guard().is_self_triggered(
            &author("Jane", "jane@example.com"),
            Some("github-actions[bot]")
        ));
    }

    #[test]
    fn partial_identity_match_is_not_enough() {
        let g = guard();
        assert!(!g.is_self_triggered(&author("scheduler-bot", "other@example.com"), None));
        assert!(!g.is_self_triggered(&author("someone", "bot@example.com"), Some("jane")));
    }

    #[test]
    fn human_commit_is_not_self_triggered() {
        assert!(!guard().is_self_triggered(&author("Jane", "jane@example.com"), Some("jane")));
    }
}
