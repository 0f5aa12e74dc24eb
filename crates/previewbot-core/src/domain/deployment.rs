//! Deployment policy, request and result types.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which events may trigger a deployment.
///
/// Loaded once from configuration and never mutated during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentPolicy {
    /// Branches whose pushes deploy
    pub push_branches: BTreeSet<String>,
    /// PR base branches whose pull requests deploy
    pub pr_base_branches: BTreeSet<String>,
    /// Globs a changed file must match when `only_if_changed` is set
    pub change_globs: Vec<String>,
    pub only_if_changed: bool,
}

/// Ordered list of paths changed by the current event.
pub type ChangeSet = Vec<String>;

/// Vercel deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTarget {
    Production,
    Staging,
}

impl DeploymentTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentTarget::Production => "production",
            DeploymentTarget::Staging => "staging",
        }
    }
}

impl std::fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(DeploymentTarget::Production),
            "staging" | "preview" => Ok(DeploymentTarget::Staging),
            other => Err(format!("unknown deployment target '{}'", other)),
        }
    }
}

/// A domain template assigned when the run's branch matches `trigger_branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasSpec {
    /// e.g. `{{BRANCH}}.preview.example.com`
    pub domain_template: String,
    pub trigger_branch: String,
}

/// Everything needed to perform one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Explicit override; `None` resolves from the branch
    pub target: Option<DeploymentTarget>,
    pub working_directory: PathBuf,
    pub project_id: String,
    pub org_id: Option<String>,
    /// Deployment name sent to Vercel; defaults to the repository name
    pub name: Option<String>,
    pub framework: Option<String>,
    pub alias_candidates: Vec<AliasSpec>,
    /// Extra metadata merged over the computed defaults
    pub metadata: BTreeMap<String, String>,
}

/// A successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Absolute https URL; never empty
    pub url: String,
    pub id: String,
    pub assigned_aliases: Vec<String>,
}
