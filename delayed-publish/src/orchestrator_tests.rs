use std::collections::HashMap;
use std::fs;

use delayed_core::{
    config::{GITHUB_REPOSITORY, GITHUB_SHA, GITHUB_WORKSPACE},
    types::{ENV_CHECKOUT_REF, ENV_CHECKOUT_REF_IS_TAG, ENV_UNSCHEDULE_TARGET_BRANCH},
    CommitIdentity, JobDefinitionDocument, JobPolicy,
};
use tempfile::TempDir;

use super::*;
use crate::client::{ClientCall, FailPoint, FakeRepoClient};

const SHA: &str = "3f786850e387550fdab836ed7e6dc881de23001b";
const TEMPLATE: &str = "\
name: Build
on: workflow_dispatch
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: echo hi
";
const TAGGED_PATH: &str = ".github/workflows/build-v1.2.yml";

struct Fixture {
    workspace: TempDir,
    env: HashMap<String, String>,
}

fn fixture() -> Fixture {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("build.yml"), TEMPLATE).expect("template");
    let env = [
        (GITHUB_SHA, SHA.to_string()),
        (GITHUB_REPOSITORY, "octo/app".to_string()),
        (GITHUB_WORKSPACE, workspace.path().display().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    Fixture {
        workspace,
        env,
    }
}

fn client() -> FakeRepoClient {
    FakeRepoClient::new().with_commit(SHA, "Jane Dev", "jane@example.com", Some("jane"))
}

fn tagged_config() -> PublishConfig {
    let mut config = PublishConfig::new("build.yml");
    config.add_tag = Some("v1.2".to_string());
    config
}

fn published_doc(client: &FakeRepoClient, branch: &str, path: &str) -> JobDefinitionDocument {
    let text = client.file(branch, path).expect("published file");
    JobDefinitionDocument::parse(&text).expect("published yaml")
}

fn server_error() -> ClientError {
    ClientError::Status {
        status: 500,
        message: "Internal Server Error".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publishes_tagged_workflow() {
    let fx = fixture();
    let client = client();
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let outcome = orchestrator.run(&fx.env).await.expect("run");

    let (result, write) = match outcome {
        RunOutcome::Published { result, write } => (result, write),
        other => panic!("expected Published, got {other:?}"),
    };
    assert_eq!(result.target_file_name, "build-v1.2.yml");
    assert_eq!(result.target_file_path, TAGGED_PATH);
    assert!(result.absolute_file_path.ends_with(TAGGED_PATH));
    assert_eq!(result.branch, "main");
    assert_eq!(result.tag.as_deref(), Some("v1.2"));
    assert!(matches!(write, WriteOutcome::Written { .. }));

    assert_eq!(client.tag("v1.2").as_deref(), Some(SHA));
    let doc = published_doc(&client, "main", TAGGED_PATH);
    assert_eq!(doc.env_value("build", ENV_CHECKOUT_REF), Some("v1.2"));
    assert_eq!(doc.env_value("build", ENV_CHECKOUT_REF_IS_TAG), Some("true"));
    assert_eq!(doc.env_value("build", ENV_UNSCHEDULE_TARGET_BRANCH), Some("main"));
}

#[tokio::test]
async fn file_path_is_absolute_without_workspace_variable() {
    let fx = fixture();
    let template = fx.workspace.path().join("build.yml");
    let mut env = fx.env.clone();
    env.remove(GITHUB_WORKSPACE);
    let client = client();
    let orchestrator = PublishOrchestrator::new(client.clone(), PublishConfig::new(template));

    let outcome = orchestrator.run(&env).await.expect("run");

    let result = match outcome {
        RunOutcome::Published { result, .. } => result,
        other => panic!("expected Published, got {other:?}"),
    };
    let cwd = std::env::current_dir().expect("cwd");
    assert!(result.absolute_file_path.is_absolute());
    assert_eq!(result.absolute_file_path, cwd.join(&result.target_file_path));
}

#[tokio::test]
async fn untagged_run_checks_out_the_commit() {
    let fx = fixture();
    let client = client();
    let mut config = PublishConfig::new("build.yml");
    config.target_branch = Some("scheduled".to_string());
    let orchestrator = PublishOrchestrator::new(client.clone(), config);

    let outcome = orchestrator.run(&fx.env).await.expect("run");

    let result = match outcome {
        RunOutcome::Published { result, .. } => result,
        other => panic!("expected Published, got {other:?}"),
    };
    assert_eq!(result.target_file_name, format!("build-{SHA}.yml"));
    let doc = published_doc(&client, "scheduled", &result.target_file_path);
    assert_eq!(doc.env_value("build", ENV_CHECKOUT_REF), Some(SHA));
    assert_eq!(doc.env_value("build", ENV_CHECKOUT_REF_IS_TAG), Some("false"));
    assert!(!client
        .calls()
        .iter()
        .any(|c| matches!(c, ClientCall::GetRepository { .. } | ClientCall::CreateRef { .. })));
}

#[tokio::test]
async fn target_branch_defaults_to_repository_default() {
    let fx = fixture();
    let client = client().with_default_branch("develop");
    let mut config = tagged_config();
    config.target_repository = Some(RepoSlug::new("octo", "deploys"));
    let orchestrator = PublishOrchestrator::new(client.clone(), config);

    orchestrator.run(&fx.env).await.expect("run");

    assert!(client.calls().contains(&ClientCall::GetRepository {
        repo: RepoSlug::new("octo", "deploys")
    }));
    let doc = published_doc(&client, "develop", TAGGED_PATH);
    assert_eq!(
        doc.env_value("build", ENV_UNSCHEDULE_TARGET_BRANCH),
        Some("develop")
    );
}

#[tokio::test]
async fn explicit_names_are_used_verbatim() {
    let fx = fixture();
    let client = client();
    let mut config = tagged_config();
    config.target_file_name = Some("nightly.yml".to_string());
    config.workflows_dir = "ci/".to_string();
    config.unschedule_target_branch = Some("cleanup".to_string());
    let orchestrator = PublishOrchestrator::new(client.clone(), config);

    let outcome = orchestrator.run(&fx.env).await.expect("run");

    let result = match outcome {
        RunOutcome::Published { result, .. } => result,
        other => panic!("expected Published, got {other:?}"),
    };
    assert_eq!(result.target_file_path, "ci/nightly.yml");
    let doc = published_doc(&client, "main", "ci/nightly.yml");
    assert_eq!(
        doc.env_value("build", ENV_UNSCHEDULE_TARGET_BRANCH),
        Some("cleanup")
    );
}

#[tokio::test]
async fn republishing_identical_content_writes_nothing() {
    let fx = fixture();
    let client = client();
    let mut config = tagged_config();
    config.override_target_file = true;
    let orchestrator = PublishOrchestrator::new(client.clone(), config);

    orchestrator.run(&fx.env).await.expect("first run");
    let outcome = orchestrator.run(&fx.env).await.expect("second run");

    assert!(matches!(
        outcome,
        RunOutcome::Published {
            write: WriteOutcome::Unchanged { .. },
            ..
        }
    ));
    let writes = client
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ClientCall::PutContent { .. }))
        .count();
    assert_eq!(writes, 1);
}

// ---------------------------------------------------------------------------
// Runs that stop early
// ---------------------------------------------------------------------------

#[tokio::test]
async fn self_triggered_run_has_no_side_effects() {
    let fx = fixture();
    let identity = CommitIdentity::default();
    let client = FakeRepoClient::new().with_commit(SHA, &identity.name, &identity.email, None);
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let outcome = orchestrator.run(&fx.env).await.expect("run");

    assert_eq!(
        outcome,
        RunOutcome::SelfTriggered {
            sha: SHA.to_string()
        }
    );
    assert_eq!(
        client.calls(),
        vec![ClientCall::GetCommit {
            sha: SHA.to_string()
        }]
    );
}

#[tokio::test]
async fn service_account_commit_is_self_triggered() {
    let fx = fixture();
    let client =
        FakeRepoClient::new().with_commit(SHA, "Someone", "someone@example.com", Some("github-actions[bot]"));
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let outcome = orchestrator.run(&fx.env).await.expect("run");

    assert!(matches!(outcome, RunOutcome::SelfTriggered { .. }));
    assert!(client.mutations().is_empty());
}

#[tokio::test]
async fn missing_context_fails_before_any_call() {
    let client = client();
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());
    let env: HashMap<String, String> = [(GITHUB_SHA.to_string(), SHA.to_string())]
        .into_iter()
        .collect();

    let err = orchestrator.run(&env).await.unwrap_err();

    assert!(matches!(err, PublishError::MissingContext { ref name } if name == GITHUB_REPOSITORY));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn missing_template_is_reported() {
    let fx = fixture();
    let client = client();
    let orchestrator = PublishOrchestrator::new(client.clone(), PublishConfig::new("nope.yml"));

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(err, PublishError::TemplateNotFound { ref path } if path.ends_with("nope.yml")));
    assert!(client.mutations().is_empty());
}

#[tokio::test]
async fn existing_target_without_override_touches_nothing() {
    let fx = fixture();
    let client = client()
        .with_tag("v1.2", "old")
        .with_file("main", TAGGED_PATH, "jobs: {}\n");
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(err, PublishError::FileAlreadyExists { ref path } if path == TAGGED_PATH));
    assert!(client.mutations().is_empty());
    assert_eq!(client.tag("v1.2").as_deref(), Some("old"));
}

#[tokio::test]
async fn strict_policy_rejects_multiple_jobs_before_mutating() {
    let fx = fixture();
    fs::write(
        fx.env[GITHUB_WORKSPACE].clone() + "/multi.yml",
        "jobs:\n  a: {}\n  b: {}\n",
    )
    .expect("template");
    let client = client();
    let mut config = tagged_config();
    config.template_file = "multi.yml".into();
    config.job_policy = JobPolicy::SingleJob;
    let orchestrator = PublishOrchestrator::new(client.clone(), config);

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(
        err,
        PublishError::Transform(delayed_core::TransformError::MultipleJobs { count: 2 })
    ));
    assert!(client.mutations().is_empty());
}

#[tokio::test]
async fn dry_run_previews_without_mutating() {
    let fx = fixture();
    let client = client();
    let mut config = tagged_config();
    config.dry_run = true;
    let orchestrator = PublishOrchestrator::new(client.clone(), config);

    let outcome = orchestrator.run(&fx.env).await.expect("run");

    let (result, diff) = match outcome {
        RunOutcome::Preview { result, diff } => (result, diff),
        other => panic!("expected Preview, got {other:?}"),
    };
    assert_eq!(result.target_file_path, TAGGED_PATH);
    let diff = diff.expect("new file produces a diff");
    assert!(diff.contains(&format!("+++ b/{TAGGED_PATH}")));
    assert!(diff.contains("DELAYED_JOB_CHECKOUT_REF"));
    assert!(client.mutations().is_empty());
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_publish_restores_existing_tag() {
    let fx = fixture();
    let client = client().with_tag("v1.2", "old");
    client.fail_next(FailPoint::PutContent, server_error());
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(err, PublishError::RemoteWrite { .. }));
    assert_eq!(client.tag("v1.2").as_deref(), Some("old"));
    assert!(client.file("main", TAGGED_PATH).is_none());
}

#[tokio::test]
async fn failed_publish_deletes_created_tag() {
    let fx = fixture();
    let client = client();
    client.fail_next(FailPoint::PutContent, server_error());
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    orchestrator.run(&fx.env).await.unwrap_err();

    assert!(client.tag("v1.2").is_none());
    assert!(client.mutations().contains(&ClientCall::DeleteRef {
        name: "tags/v1.2".to_string()
    }));
}

#[tokio::test]
async fn failed_tag_move_restores_tag() {
    let fx = fixture();
    let client = client().with_tag("v1.2", "old");
    client.fail_next(FailPoint::UpdateRef, ClientError::Transport("reset".to_string()));
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(err, PublishError::RefMutation { ref tag, .. } if tag == "v1.2"));
    assert_eq!(client.tag("v1.2").as_deref(), Some("old"));
    assert!(!client
        .calls()
        .iter()
        .any(|c| matches!(c, ClientCall::PutContent { .. })));
}

#[tokio::test]
async fn concurrent_modification_restores_tag_and_keeps_original_error() {
    let fx = fixture();
    let client = client()
        .with_tag("v1.2", "old")
        .with_file("main", TAGGED_PATH, "jobs: {}\n");
    client.fail_next(FailPoint::PutContent, ClientError::Conflict("moved".to_string()));
    let mut config = tagged_config();
    config.override_target_file = true;
    let orchestrator = PublishOrchestrator::new(client.clone(), config);

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(err, PublishError::ConcurrentModification { .. }));
    assert_eq!(client.tag("v1.2").as_deref(), Some("old"));
    assert_eq!(client.file("main", TAGGED_PATH).as_deref(), Some("jobs: {}\n"));
}

#[tokio::test]
async fn rejected_tag_creation_is_not_rolled_back() {
    let fx = fixture();
    let client = client();
    client.fail_next(
        FailPoint::CreateRef,
        ClientError::Status {
            status: 422,
            message: "Reference already exists".to_string(),
        },
    );
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(err, PublishError::RefMutation { .. }));
    assert_eq!(
        client.mutations(),
        vec![ClientCall::CreateRef {
            name: "tags/v1.2".to_string(),
            sha: SHA.to_string(),
        }]
    );
}

#[tokio::test]
async fn rollback_failure_does_not_mask_publish_error() {
    let fx = fixture();
    let client = client();
    client.fail_next(FailPoint::PutContent, server_error());
    client.fail_next(FailPoint::DeleteRef, server_error());
    let orchestrator = PublishOrchestrator::new(client.clone(), tagged_config());

    let err = orchestrator.run(&fx.env).await.unwrap_err();

    assert!(matches!(err, PublishError::RemoteWrite { .. }));
    assert_eq!(client.tag("v1.2").as_deref(), Some(SHA));
}

// ---------------------------------------------------------------------------
// File naming
// ---------------------------------------------------------------------------

#[test]
fn derived_name_replaces_slashes_in_ref() {
    assert_eq!(
        derive_file_name(Path::new("ci/release.yml"), "release/2024.1"),
        "release-release-2024.1.yml"
    );
    assert_eq!(
        derive_file_name(Path::new("deploy.yaml"), "v3"),
        "deploy-v3.yml"
    );
}
