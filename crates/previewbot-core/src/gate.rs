//! Change/policy gate.
//!
//! Decides whether this run deploys at all: first the branch policy for the
//! event kind, then (when `only_if_changed` is set) whether any changed file
//! matches a configured glob. Failing to compute the change set fails open.

use remote_state::{ChangeSource, RemoteResult, CHANGED_FILES_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{ChangeSet, DeploymentPolicy, EventKind, Result, RunContext};
use crate::glob::{compile_all, GlobPattern};
use crate::obs;

/// GitHub caps PR file listings at 3000 entries.
const MAX_FILE_PAGES: u32 = 30;

/// Outcome of gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Branch policy allows this event
    pub allowed: bool,
    /// Changes are relevant (always true when change detection is off)
    pub relevant: bool,
    pub reason: String,
    /// Number of changed files inspected, if a change set was computed
    pub changed_files: Option<usize>,
}

impl GateDecision {
    pub fn should_deploy(&self) -> bool {
        self.allowed && self.relevant
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            relevant: false,
            reason,
            changed_files: None,
        }
    }
}

/// Branch policy check.
///
/// Push (and any non-PR event): the pushed branch must be in
/// `push_branches`. Pull request: the base branch must be in
/// `pr_base_branches`.
pub fn should_deploy(ctx: &RunContext, policy: &DeploymentPolicy) -> bool {
    match ctx.event {
        EventKind::PullRequest => ctx
            .pull_request
            .as_ref()
            .map(|pr| policy.pr_base_branches.contains(&pr.base_ref))
            .unwrap_or(false),
        EventKind::Push | EventKind::Other(_) => ctx
            .push_branch()
            .map(|branch| policy.push_branches.contains(branch))
            .unwrap_or(false),
    }
}

/// Whether any changed path matches any glob.
pub fn is_relevant(changes: &[String], globs: &[GlobPattern]) -> bool {
    changes
        .iter()
        .any(|path| globs.iter().any(|glob| glob.is_match(path)))
}

/// Compute the change set for the event.
///
/// Returns `Ok(None)` when there is nothing to compare against (a PR run
/// without a number, or a new branch whose head is a root commit).
pub async fn change_set(
    ctx: &RunContext,
    source: &dyn ChangeSource,
) -> RemoteResult<Option<ChangeSet>> {
    if ctx.event == EventKind::PullRequest {
        let Some(number) = ctx.pull_request_number() else {
            return Ok(None);
        };
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let batch = source.pull_request_files(number, page).await?;
            let last = (batch.len() as u32) < CHANGED_FILES_PAGE_SIZE;
            files.extend(batch);
            if last {
                break;
            }
        }
        return Ok(Some(files));
    }

    let base = if ctx.is_new_branch_push() {
        match source.commit_parent(&ctx.sha).await? {
            Some(parent) => parent,
            None => return Ok(None),
        }
    } else {
        ctx.before_sha.clone().unwrap_or_default()
    };
    debug!(base = %base, head = %ctx.sha, "Comparing commits for change detection");
    source.compare_files(&base, &ctx.sha).await.map(Some)
}

/// Full gate: branch policy, then change relevance.
///
/// Only an invalid glob is an error; remote failures fail open.
pub async fn evaluate(
    ctx: &RunContext,
    policy: &DeploymentPolicy,
    source: &dyn ChangeSource,
) -> Result<GateDecision> {
    let globs = if policy.only_if_changed {
        compile_all(&policy.change_globs)?
    } else {
        Vec::new()
    };

    if !should_deploy(ctx, policy) {
        let reason = match ctx.event {
            EventKind::PullRequest => format!(
                "base branch '{}' is not configured for deployment",
                ctx.pull_request
                    .as_ref()
                    .map(|pr| pr.base_ref.as_str())
                    .unwrap_or("unknown")
            ),
            _ => format!(
                "branch '{}' is not configured for deployment",
                ctx.push_branch().unwrap_or(&ctx.git_ref)
            ),
        };
        let decision = GateDecision::denied(reason);
        obs::emit_gate_evaluated(false, false, &decision.reason);
        return Ok(decision);
    }

    if !policy.only_if_changed {
        let decision = GateDecision {
            allowed: true,
            relevant: true,
            reason: "branch policy allows deployment".to_string(),
            changed_files: None,
        };
        obs::emit_gate_evaluated(true, true, &decision.reason);
        return Ok(decision);
    }

    let decision = match change_set(ctx, source).await {
        Ok(Some(changes)) => {
            let relevant = is_relevant(&changes, &globs);
            GateDecision {
                allowed: true,
                relevant,
                reason: if relevant {
                    "relevant files changed".to_string()
                } else {
                    format!("none of {} changed files match the change globs", changes.len())
                },
                changed_files: Some(changes.len()),
            }
        }
        Ok(None) => GateDecision {
            allowed: true,
            relevant: true,
            reason: "no comparison base; deploying".to_string(),
            changed_files: None,
        },
        Err(err) => {
            warn!(error = %err, "Could not compute change set; deploying anyway");
            GateDecision {
                allowed: true,
                relevant: true,
                reason: "change detection failed; deploying".to_string(),
                changed_files: None,
            }
        }
    };
    obs::emit_gate_evaluated(decision.allowed, decision.relevant, &decision.reason);
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PullRequestInfo;

    fn push(branch: &str) -> RunContext {
        RunContext::from_lookup(|k| match k {
            "GITHUB_EVENT_NAME" => Some("push".to_string()),
            "GITHUB_REF" => Some(format!("refs/heads/{}", branch)),
            "GITHUB_SHA" => Some("head".to_string()),
            _ => None,
        })
    }

    fn pull(base: &str) -> RunContext {
        let mut ctx = RunContext::from_lookup(|k| match k {
            "GITHUB_EVENT_NAME" => Some("pull_request".to_string()),
            _ => None,
        });
        ctx.pull_request = Some(PullRequestInfo {
            number: 5,
            base_ref: base.to_string(),
            head_ref: "feature".to_string(),
        });
        ctx
    }

    fn policy(push: &[&str], prs: &[&str]) -> DeploymentPolicy {
        DeploymentPolicy {
            push_branches: push.iter().map(|s| s.to_string()).collect(),
            pr_base_branches: prs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_push_allowlist() {
        let p = policy(&["main", "release"], &[]);
        for branch in ["main", "release"] {
            assert!(should_deploy(&push(branch), &p));
        }
        for branch in ["dev", "mainline", "feature/main"] {
            assert!(!should_deploy(&push(branch), &p));
        }
    }

    #[test]
    fn test_pr_allowlist_independent_of_push() {
        let p = policy(&[], &["main"]);
        assert!(should_deploy(&pull("main"), &p));
        assert!(!should_deploy(&pull("dev"), &p));
        assert!(!should_deploy(&push("main"), &p));
    }

    #[test]
    fn test_pr_without_details_is_denied() {
        let mut ctx = pull("main");
        ctx.pull_request = None;
        assert!(!should_deploy(&ctx, &policy(&[], &["main"])));
    }

    #[test]
    fn test_tag_push_is_denied() {
        let ctx = RunContext::from_lookup(|k| match k {
            "GITHUB_EVENT_NAME" => Some("push".to_string()),
            "GITHUB_REF" => Some("refs/tags/main".to_string()),
            _ => None,
        });
        assert!(!should_deploy(&ctx, &policy(&["main"], &[])));
    }

    #[test]
    fn test_is_relevant() {
        let globs = compile_all(&["docs/**".to_string(), "*.md".to_string()]).unwrap();
        assert!(is_relevant(&["docs/a/b.md".to_string()], &globs));
        assert!(is_relevant(&["README.md".to_string()], &globs));
        assert!(!is_relevant(&["src/a.rs".to_string()], &globs));
        assert!(!is_relevant(&[], &globs));
    }
}
