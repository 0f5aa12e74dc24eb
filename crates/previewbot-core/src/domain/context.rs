//! Immutable description of the CI event being handled.
//!
//! Built once at startup from the process environment (or any lookup
//! function in tests) and passed by reference everywhere else.

use remote_state::CommentTarget;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The placeholder `before` sha GitHub sends for a newly created branch.
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Kind of event that triggered the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    /// Anything else (`workflow_dispatch`, `schedule`, ...); gated like a push.
    Other(String),
}

impl EventKind {
    pub fn from_event_name(name: &str) -> Self {
        match name {
            "push" => EventKind::Push,
            "pull_request" | "pull_request_target" => EventKind::PullRequest,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// Pull request details for PR-triggered runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub base_ref: String,
    pub head_ref: String,
}

/// Everything previewbot knows about the triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub event: EventKind,
    /// `GITHUB_REF`, e.g. `refs/heads/main`
    pub git_ref: String,
    /// `GITHUB_HEAD_REF`; only set for PR events
    pub head_ref: Option<String>,
    /// `owner/repo`
    pub repository: String,
    pub sha: String,
    /// Previous tip for push events
    pub before_sha: Option<String>,
    pub actor: String,
    pub pull_request: Option<PullRequestInfo>,
    pub commit_message: Option<String>,
    pub commit_author: Option<String>,
    /// Link to the workflow run, attached to deployment statuses
    pub run_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RunContext {
    /// Build a context from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let event = EventKind::from_event_name(&lookup("GITHUB_EVENT_NAME").unwrap_or_default());
        let git_ref = lookup("GITHUB_REF").unwrap_or_default();
        let head_ref = non_empty(lookup("GITHUB_HEAD_REF"));
        let base_ref = non_empty(lookup("GITHUB_BASE_REF"));

        let pull_request = match (pull_number_from_ref(&git_ref), &base_ref) {
            (Some(number), Some(base)) => Some(PullRequestInfo {
                number,
                base_ref: base.clone(),
                head_ref: head_ref.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        let run_url = match (
            non_empty(lookup("GITHUB_SERVER_URL")),
            non_empty(lookup("GITHUB_REPOSITORY")),
            non_empty(lookup("GITHUB_RUN_ID")),
        ) {
            (Some(server), Some(repo), Some(run_id)) => {
                Some(format!("{}/{}/actions/runs/{}", server, repo, run_id))
            }
            _ => None,
        };

        Self {
            event,
            git_ref,
            head_ref,
            repository: lookup("GITHUB_REPOSITORY").unwrap_or_default(),
            sha: lookup("GITHUB_SHA").unwrap_or_default(),
            before_sha: None,
            actor: lookup("GITHUB_ACTOR").unwrap_or_default(),
            pull_request,
            commit_message: None,
            commit_author: None,
            run_url,
        }
    }

    /// Build a context from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Fill in the details only the webhook payload carries
    /// (`GITHUB_EVENT_PATH`): PR number and refs, `before`, head commit.
    pub fn with_event_payload(mut self, payload: &Value) -> Self {
        if let Some(pr) = payload.get("pull_request") {
            let number = pr.get("number").and_then(Value::as_u64);
            let base = pr
                .pointer("/base/ref")
                .and_then(Value::as_str)
                .map(str::to_string);
            let head = pr
                .pointer("/head/ref")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(number) = number {
                self.pull_request = Some(PullRequestInfo {
                    number,
                    base_ref: base.unwrap_or_default(),
                    head_ref: head.or_else(|| self.head_ref.clone()).unwrap_or_default(),
                });
            }
            if let Some(title) = pr.get("title").and_then(Value::as_str) {
                self.commit_message.get_or_insert_with(|| title.to_string());
            }
            if let Some(login) = pr.pointer("/user/login").and_then(Value::as_str) {
                self.commit_author.get_or_insert_with(|| login.to_string());
            }
        }
        if let Some(before) = payload.get("before").and_then(Value::as_str) {
            self.before_sha = Some(before.to_string());
        }
        if let Some(commit) = payload.get("head_commit") {
            if let Some(message) = commit.get("message").and_then(Value::as_str) {
                self.commit_message = Some(message.to_string());
            }
            if let Some(name) = commit.pointer("/author/name").and_then(Value::as_str) {
                self.commit_author = Some(name.to_string());
            }
        }
        self
    }

    /// Branch this run deploys; see [`resolve_branch`].
    pub fn branch(&self) -> String {
        resolve_branch(self.head_ref.as_deref(), Some(&self.git_ref))
    }

    /// Branch for push gating: `GITHUB_REF` with `refs/heads/` stripped.
    pub fn push_branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }

    pub fn pull_request_number(&self) -> Option<u64> {
        self.pull_request.as_ref().map(|pr| pr.number)
    }

    /// PR runs comment on the PR, everything else on the commit.
    pub fn comment_target(&self) -> CommentTarget {
        match self.pull_request_number() {
            Some(number) => CommentTarget::PullRequest { number },
            None => CommentTarget::Commit {
                sha: self.sha.clone(),
            },
        }
    }

    /// Whether `before` is missing or the all-zero new-branch placeholder.
    pub fn is_new_branch_push(&self) -> bool {
        match self.before_sha.as_deref() {
            None => true,
            Some(before) => before.is_empty() || before == ZERO_SHA,
        }
    }
}

/// Resolve the branch name for a run.
///
/// Precedence: head ref (PR context) > `refs/heads/<branch>` >
/// `refs/tags/<tag>` > `"unknown"`.
pub fn resolve_branch(head_ref: Option<&str>, git_ref: Option<&str>) -> String {
    if let Some(head) = head_ref.filter(|h| !h.trim().is_empty()) {
        return head.to_string();
    }
    if let Some(git_ref) = git_ref {
        if let Some(branch) = git_ref.strip_prefix("refs/heads/") {
            return branch.to_string();
        }
        if let Some(tag) = git_ref.strip_prefix("refs/tags/") {
            return tag.to_string();
        }
    }
    "unknown".to_string()
}

/// `refs/pull/<n>/merge` -> `n`
fn pull_number_from_ref(git_ref: &str) -> Option<u64> {
    git_ref
        .strip_prefix("refs/pull/")
        .and_then(|rest| rest.split('/').next())
        .and_then(|n| n.parse().ok())
}
