//! Gate evaluation against the in-memory change source.

use previewbot_core::{evaluate_gate, DeploymentPolicy, PreviewError, PullRequestInfo, RunContext};
use remote_state::fakes::MemoryChangeSource;

const ZERO: &str = "0000000000000000000000000000000000000000";

fn policy(globs: &[&str]) -> DeploymentPolicy {
    DeploymentPolicy {
        push_branches: ["main".to_string()].into_iter().collect(),
        pr_base_branches: ["main".to_string()].into_iter().collect(),
        change_globs: globs.iter().map(|g| g.to_string()).collect(),
        only_if_changed: true,
    }
}

fn push(before: Option<&str>) -> RunContext {
    let mut ctx = RunContext::from_lookup(|k| match k {
        "GITHUB_EVENT_NAME" => Some("push".to_string()),
        "GITHUB_REF" => Some("refs/heads/main".to_string()),
        "GITHUB_SHA" => Some("head".to_string()),
        _ => None,
    });
    ctx.before_sha = before.map(str::to_string);
    ctx
}

fn pull() -> RunContext {
    let mut ctx = RunContext::from_lookup(|k| match k {
        "GITHUB_EVENT_NAME" => Some("pull_request".to_string()),
        "GITHUB_SHA" => Some("head".to_string()),
        _ => None,
    });
    ctx.pull_request = Some(PullRequestInfo {
        number: 3,
        base_ref: "main".to_string(),
        head_ref: "docs".to_string(),
    });
    ctx
}

#[tokio::test]
async fn test_push_with_relevant_change_deploys() {
    let source = MemoryChangeSource::new().with_comparison("prev", "head", &["docs/a/b.md"]);
    let decision = evaluate_gate(&push(Some("prev")), &policy(&["docs/**"]), &source)
        .await
        .unwrap();
    assert!(decision.should_deploy());
    assert_eq!(decision.changed_files, Some(1));
    assert_eq!(source.calls(), vec!["compare:prev...head"]);
}

#[tokio::test]
async fn test_push_with_irrelevant_change_skips() {
    let source = MemoryChangeSource::new().with_comparison("prev", "head", &["src/a.md"]);
    let decision = evaluate_gate(&push(Some("prev")), &policy(&["docs/**"]), &source)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert!(!decision.relevant);
    assert!(!decision.should_deploy());
}

#[tokio::test]
async fn test_new_branch_compares_against_parent() {
    let source = MemoryChangeSource::new()
        .with_parent("head", "parent")
        .with_comparison("parent", "head", &["docs/index.md"]);
    let decision = evaluate_gate(&push(Some(ZERO)), &policy(&["docs/**"]), &source)
        .await
        .unwrap();
    assert!(decision.should_deploy());
    assert_eq!(source.calls(), vec!["parent:head", "compare:parent...head"]);
}

#[tokio::test]
async fn test_root_commit_fails_open() {
    let source = MemoryChangeSource::new();
    let decision = evaluate_gate(&push(None), &policy(&["docs/**"]), &source)
        .await
        .unwrap();
    assert!(decision.should_deploy());
}

#[tokio::test]
async fn test_api_failure_fails_open() {
    let source = MemoryChangeSource::new().failing();
    let decision = evaluate_gate(&pull(), &policy(&["docs/**"]), &source)
        .await
        .unwrap();
    assert!(decision.should_deploy());
    assert!(decision.changed_files.is_none());
}

#[tokio::test]
async fn test_pull_request_reads_every_page() {
    let mut files: Vec<String> = (0..150).map(|i| format!("src/{}.rs", i)).collect();
    files.push("docs/late.md".to_string());
    let refs: Vec<&str> = files.iter().map(String::as_str).collect();
    let source = MemoryChangeSource::new().with_pr_files(&refs);

    let decision = evaluate_gate(&pull(), &policy(&["docs/**"]), &source)
        .await
        .unwrap();

    assert!(decision.should_deploy());
    assert_eq!(decision.changed_files, Some(151));
    assert_eq!(source.calls(), vec!["pr_files:3:1", "pr_files:3:2"]);
}

#[tokio::test]
async fn test_denied_branch_skips_change_lookup() {
    let source = MemoryChangeSource::new();
    let mut ctx = push(Some("prev"));
    ctx.git_ref = "refs/heads/dev".to_string();
    let decision = evaluate_gate(&ctx, &policy(&["docs/**"]), &source)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert!(source.calls().is_empty());
    assert!(decision.reason.contains("dev"));
}

#[tokio::test]
async fn test_change_detection_off_needs_no_source() {
    let source = MemoryChangeSource::new().failing();
    let mut p = policy(&[]);
    p.only_if_changed = false;
    let decision = evaluate_gate(&push(Some("prev")), &p, &source).await.unwrap();
    assert!(decision.should_deploy());
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_glob_is_configuration_error() {
    let source = MemoryChangeSource::new();
    let long = "a".repeat(1001);
    let err = evaluate_gate(&push(Some("prev")), &policy(&[long.as_str()]), &source)
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::Configuration(_)));
}
