//! Remote trait definitions for previewbot
//!
//! These traits define the only state previewbot ever reads or writes:
//! - `CommentStore`: PR / commit comments (discovery and mutation)
//! - `DeploymentLedger`: GitHub deployment records and their statuses
//! - `ChangeSource`: changed-file listings for the current event
//! - `VercelApi`: the deploy call and alias assignment
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Page size used for every paginated comment query.
pub const COMMENT_PAGE_SIZE: u32 = 100;

/// Page size used when listing the files of a pull request.
pub const CHANGED_FILES_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// CommentStore - PR and commit comments
// ---------------------------------------------------------------------------

/// Where this run's sticky comment lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommentTarget {
    PullRequest { number: u64 },
    Commit { sha: String },
}

impl std::fmt::Display for CommentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommentTarget::PullRequest { number } => write!(f, "PR #{}", number),
            CommentTarget::Commit { sha } => write!(f, "commit {}", &sha[..7.min(sha.len())]),
        }
    }
}

/// Identity of a remote comment.
///
/// `node_id` is the GraphQL global id; `database_id` is the REST id, which
/// commit-comment endpoints need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentId {
    pub node_id: String,
    pub database_id: Option<u64>,
}

impl CommentId {
    pub fn new(node_id: impl Into<String>, database_id: Option<u64>) -> Self {
        Self {
            node_id: node_id.into(),
            database_id,
        }
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.node_id)
    }
}

/// A comment as currently stored on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteComment {
    pub id: CommentId,
    pub author_login: String,
    pub is_minimized: bool,
    pub body: String,
}

/// One page of a comment listing.
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<RemoteComment>,
    /// Opaque cursor for the next page; `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// Comment persistence on a PR or commit.
///
/// Guarantees:
/// - `list_comments` returns comments oldest-first within and across pages.
/// - `update_comment` replaces the whole body in one write.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Login of the identity the store authenticates as.
    async fn viewer_login(&self) -> RemoteResult<String>;

    /// Every login whose comments this store may have written.
    async fn identities(&self) -> RemoteResult<Vec<String>> {
        Ok(vec![self.viewer_login().await?])
    }

    /// List one page of comments, starting after `cursor`.
    async fn list_comments(
        &self,
        target: &CommentTarget,
        cursor: Option<&str>,
    ) -> RemoteResult<CommentPage>;

    /// Create a comment and return its id.
    async fn create_comment(&self, target: &CommentTarget, body: &str) -> RemoteResult<CommentId>;

    /// Replace the body of an existing comment.
    async fn update_comment(
        &self,
        target: &CommentTarget,
        id: &CommentId,
        body: &str,
    ) -> RemoteResult<()>;

    /// Delete a comment.
    async fn delete_comment(&self, target: &CommentTarget, id: &CommentId) -> RemoteResult<()>;

    /// Minimize (hide) a comment as outdated.
    async fn minimize_comment(&self, target: &CommentTarget, id: &CommentId) -> RemoteResult<()>;
}

// ---------------------------------------------------------------------------
// DeploymentLedger - GitHub deployment records
// ---------------------------------------------------------------------------

/// GitHub deployment id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentRecordId(pub u64);

impl std::fmt::Display for DeploymentRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Pending,
    InProgress,
    Success,
    Failure,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::InProgress => "in_progress",
            DeploymentState::Success => "success",
            DeploymentState::Failure => "failure",
        }
    }

    /// Whether no further transition is allowed after this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Success | DeploymentState::Failure)
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeployment {
    /// Git ref or sha being deployed
    pub git_ref: String,
    /// Environment name (`production` or `preview/<branch>`)
    pub environment: String,
    pub transient: bool,
    pub production: bool,
    pub description: String,
}

/// A status transition posted to a deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatusUpdate {
    pub state: DeploymentState,
    pub description: String,
    pub environment_url: Option<String>,
    pub log_url: Option<String>,
}

/// A deployment record as listed by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub id: DeploymentRecordId,
    pub environment: String,
    pub git_ref: String,
    pub created_at: DateTime<Utc>,
}

/// A status entry as listed by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatusEntry {
    pub state: DeploymentState,
    pub environment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// GitHub deployment bookkeeping.
///
/// Guarantees:
/// - `list_deployments` and `list_statuses` return newest first.
#[async_trait]
pub trait DeploymentLedger: Send + Sync {
    /// Create a deployment record, returning its id.
    async fn create_deployment(&self, request: &NewDeployment)
        -> RemoteResult<DeploymentRecordId>;

    /// Post a status transition to a deployment record.
    async fn create_status(
        &self,
        id: DeploymentRecordId,
        update: &DeploymentStatusUpdate,
    ) -> RemoteResult<()>;

    /// List deployments for an environment.
    async fn list_deployments(&self, environment: &str) -> RemoteResult<Vec<DeploymentSummary>>;

    /// List the statuses of one deployment.
    async fn list_statuses(&self, id: DeploymentRecordId)
        -> RemoteResult<Vec<DeploymentStatusEntry>>;
}

// ---------------------------------------------------------------------------
// ChangeSource - changed files for the current event
// ---------------------------------------------------------------------------

/// Changed-file listings.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// One page (1-based) of the files changed by a pull request.
    ///
    /// A page shorter than [`CHANGED_FILES_PAGE_SIZE`] is the last one.
    async fn pull_request_files(&self, number: u64, page: u32) -> RemoteResult<Vec<String>>;

    /// Files changed between two commits.
    async fn compare_files(&self, base: &str, head: &str) -> RemoteResult<Vec<String>>;

    /// First parent of a commit, `None` for a root commit.
    async fn commit_parent(&self, sha: &str) -> RemoteResult<Option<String>>;
}

// ---------------------------------------------------------------------------
// VercelApi - deploy and alias
// ---------------------------------------------------------------------------

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployFile {
    /// Repository-relative path with `/` separators
    pub file: String,
    /// Base64 file content
    pub data: String,
    pub encoding: String,
}

/// Project settings sent along with a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

/// Body of a Vercel deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VercelDeployRequest {
    pub name: String,
    pub project: String,
    pub target: String,
    pub files: Vec<DeployFile>,
    pub meta: BTreeMap<String, String>,
    pub project_settings: ProjectSettings,
}

/// A deployment created by Vercel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VercelDeployment {
    pub id: String,
    /// Absolute https URL of the deployment
    pub url: String,
}

/// Vercel deployment API.
#[async_trait]
pub trait VercelApi: Send + Sync {
    /// Create a deployment. A 2xx without a URL is `RemoteError::MissingDeploymentUrl`.
    async fn create_deployment(
        &self,
        team_id: Option<&str>,
        request: &VercelDeployRequest,
    ) -> RemoteResult<VercelDeployment>;

    /// Assign an alias to a deployment, returning the assigned alias.
    async fn assign_alias(
        &self,
        team_id: Option<&str>,
        deployment_id: &str,
        alias: &str,
    ) -> RemoteResult<String>;
}

/// Prefix a bare host with `https://`, leaving absolute URLs alone.
pub fn ensure_https(url: &str) -> String {
    if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_https() {
        assert_eq!(ensure_https("app-abc.vercel.app"), "https://app-abc.vercel.app");
        assert_eq!(ensure_https("https://x.example.com"), "https://x.example.com");
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeploymentState::Success.is_terminal());
        assert!(DeploymentState::Failure.is_terminal());
        assert!(!DeploymentState::Pending.is_terminal());
        assert!(!DeploymentState::InProgress.is_terminal());
    }

    #[test]
    fn test_comment_target_display() {
        let pr = CommentTarget::PullRequest { number: 42 };
        assert_eq!(pr.to_string(), "PR #42");
        let commit = CommentTarget::Commit {
            sha: "0123456789abcdef".to_string(),
        };
        assert_eq!(commit.to_string(), "commit 0123456");
    }

    #[test]
    fn test_deploy_request_serializes_camel_case() {
        let req = VercelDeployRequest {
            name: "site".to_string(),
            project: "prj_1".to_string(),
            target: "production".to_string(),
            files: vec![],
            meta: BTreeMap::new(),
            project_settings: ProjectSettings::default(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("projectSettings").is_some());
        assert_eq!(json["target"], "production");
    }
}
