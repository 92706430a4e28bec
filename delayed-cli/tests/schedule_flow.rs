//! A scheduled copy carries enough context to remove itself again.

use std::collections::HashMap;
use std::fs;

use delayed_core::{
    config::{GITHUB_REPOSITORY, GITHUB_SHA, GITHUB_WORKSPACE},
    types::{
        ENV_CHECKOUT_REF, ENV_CHECKOUT_REF_IS_TAG, ENV_UNSCHEDULE_TARGET_BRANCH,
        ENV_WORKFLOW_FILE_PATH,
    },
    JobDefinitionDocument, PublishConfig, RepoSlug,
};
use delayed_publish::{
    client::{ClientCall, FakeRepoClient},
    PublishOrchestrator, RemoveOutcome, RunOutcome, TagRemoval, UnscheduleConfig, Unscheduler,
    WriteOutcome,
};
use tempfile::TempDir;

const SHA: &str = "9c1185a5c5e9fc54612808977ee8f548b2258d31";
const TEMPLATE: &str = "\
name: Nightly
on: workflow_dispatch
jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - run: make test
  report:
    runs-on: ubuntu-latest
    steps:
      - run: make report
";

fn runner_env(workspace: &TempDir) -> HashMap<String, String> {
    [
        (GITHUB_SHA, SHA.to_string()),
        (GITHUB_REPOSITORY, "octo/app".to_string()),
        (GITHUB_WORKSPACE, workspace.path().display().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// The environment the scheduled job sees when it runs `unschedule`.
fn job_env(doc: &JobDefinitionDocument, job: &str) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = [
        ENV_CHECKOUT_REF,
        ENV_CHECKOUT_REF_IS_TAG,
        ENV_UNSCHEDULE_TARGET_BRANCH,
        ENV_WORKFLOW_FILE_PATH,
    ]
    .into_iter()
    .filter_map(|key| Some((key.to_string(), doc.env_value(job, key)?.to_string())))
    .collect();
    env.insert(GITHUB_REPOSITORY.to_string(), "octo/app".to_string());
    env
}

#[tokio::test]
async fn scheduled_job_unschedules_itself() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("nightly.yml"), TEMPLATE).expect("template");
    let client = FakeRepoClient::new()
        .with_default_branch("trunk")
        .with_commit(SHA, "Jane Dev", "jane@example.com", Some("jane"));

    let mut config = PublishConfig::new("nightly.yml");
    config.add_tag = Some("nightly/42".to_string());
    let outcome = PublishOrchestrator::new(client.clone(), config)
        .run(&runner_env(&workspace))
        .await
        .expect("schedule");

    let result = match outcome {
        RunOutcome::Published {
            result,
            write: WriteOutcome::Written { .. },
        } => result,
        other => panic!("expected a written file, got {other:?}"),
    };
    assert_eq!(result.target_file_path, ".github/workflows/nightly-nightly-42.yml");
    assert_eq!(result.branch, "trunk");
    assert_eq!(client.tag("nightly/42").as_deref(), Some(SHA));

    let text = client
        .file("trunk", &result.target_file_path)
        .expect("published file");
    let doc = JobDefinitionDocument::parse(&text).expect("published yaml");
    assert_eq!(job_env(&doc, "test"), job_env(&doc, "report"));

    let unschedule = UnscheduleConfig {
        delete_tag: true,
        ..UnscheduleConfig::default()
    };
    let cleanup = Unscheduler::new(client.clone(), unschedule)
        .run(&job_env(&doc, "report"))
        .await
        .expect("unschedule");

    assert_eq!(cleanup.repository, RepoSlug::new("octo", "app"));
    assert_eq!(cleanup.branch, "trunk");
    assert!(matches!(cleanup.file, RemoveOutcome::Removed { .. }));
    assert_eq!(
        cleanup.tag,
        Some(TagRemoval::Deleted {
            tag: "nightly/42".to_string()
        })
    );
    assert!(client.file("trunk", &result.target_file_path).is_none());
    assert!(client.tag("nightly/42").is_none());
}

#[tokio::test]
async fn commit_scheduled_job_leaves_tags_alone() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("nightly.yml"), TEMPLATE).expect("template");
    let client = FakeRepoClient::new()
        .with_commit(SHA, "Jane Dev", "jane@example.com", None)
        .with_tag("nightly/41", "0000");

    PublishOrchestrator::new(client.clone(), PublishConfig::new("nightly.yml"))
        .run(&runner_env(&workspace))
        .await
        .expect("schedule");

    let path = format!(".github/workflows/nightly-{SHA}.yml");
    let text = client.file("main", &path).expect("published file");
    let doc = JobDefinitionDocument::parse(&text).expect("published yaml");
    assert_eq!(doc.env_value("test", ENV_CHECKOUT_REF_IS_TAG), Some("false"));

    let unschedule = UnscheduleConfig {
        delete_tag: true,
        ..UnscheduleConfig::default()
    };
    let cleanup = Unscheduler::new(client.clone(), unschedule)
        .run(&job_env(&doc, "test"))
        .await
        .expect("unschedule");

    assert_eq!(cleanup.tag, None);
    assert!(client.file("main", &path).is_none());
    assert!(!client
        .mutations()
        .iter()
        .any(|call| matches!(call, ClientCall::CreateRef { .. } | ClientCall::DeleteRef { .. })));
}
