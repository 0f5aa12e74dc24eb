//! Default markdown for the sticky comment.
//!
//! The comment manager treats bodies as opaque strings; this is just the
//! producer the pipeline uses unless a body is supplied.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::classify::ActionableError;
use crate::domain::{DeploymentResult, DeploymentTarget, RunContext};

/// What happened this run, as far as the comment is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Deployed {
        result: DeploymentResult,
        target: DeploymentTarget,
        environment: String,
    },
    Failed {
        diagnosis: ActionableError,
    },
    Skipped {
        reason: String,
        /// Most recent successful deployment for the environment, if known
        last_url: Option<String>,
    },
}

fn short_sha(sha: &str) -> &str {
    &sha[..7.min(sha.len())]
}

/// Render the markdown body for `outcome`.
pub fn render_comment(ctx: &RunContext, outcome: &RunOutcome) -> String {
    let mut out = String::new();
    let commit = short_sha(&ctx.sha);

    // `write!` into a String cannot fail.
    match outcome {
        RunOutcome::Deployed {
            result,
            target,
            environment,
        } => {
            let _ = writeln!(out, "### Deployment ready");
            let _ = writeln!(out);
            let _ = writeln!(out, "| | |");
            let _ = writeln!(out, "|---|---|");
            let _ = writeln!(out, "| **URL** | {} |", result.url);
            let _ = writeln!(out, "| **Target** | {} |", target);
            let _ = writeln!(out, "| **Environment** | `{}` |", environment);
            let _ = writeln!(out, "| **Commit** | `{}` |", commit);
            if !result.assigned_aliases.is_empty() {
                let aliases: Vec<String> = result
                    .assigned_aliases
                    .iter()
                    .map(|a| format!("`{}`", a))
                    .collect();
                let _ = writeln!(out, "| **Aliases** | {} |", aliases.join(", "));
            }
        }
        RunOutcome::Failed { diagnosis } => {
            let _ = writeln!(out, "### Deployment failed");
            let _ = writeln!(out);
            let _ = writeln!(out, "Commit `{}` could not be deployed ({}).", commit, diagnosis.kind);
            let _ = writeln!(out);
            let _ = writeln!(out, "**{}**", diagnosis.suggestion);
            let _ = writeln!(out);
            for item in &diagnosis.action_items {
                let _ = writeln!(out, "- {}", item);
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "<details><summary>Error</summary>");
            let _ = writeln!(out);
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "{}", diagnosis.message);
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "</details>");
        }
        RunOutcome::Skipped { reason, last_url } => {
            let _ = writeln!(out, "### Deployment skipped");
            let _ = writeln!(out);
            let _ = writeln!(out, "Commit `{}` was not deployed: {}.", commit, reason);
            if let Some(url) = last_url {
                let _ = writeln!(out);
                let _ = writeln!(out, "Latest successful deployment: {}", url);
            }
        }
    }

    out.trim_end().to_string()
}
