//! Remote-State: GitHub and Vercel access for previewbot
//!
//! previewbot keeps no state of its own. Everything it knows about a PR,
//! a deployment or a comment is read from GitHub or Vercel immediately
//! before it acts, and everything it decides is written back there.
//!
//! ## Layer 0 - Remote systems
//!
//! Focus: one trait per remote concern, a reqwest backend for each, and
//! in-memory fakes with the same contracts.
//!
//! ## Key Components
//!
//! - `CommentStore`: paginated comment discovery and mutation
//! - `DeploymentLedger`: GitHub deployment records and statuses
//! - `ChangeSource`: changed files for a PR or push
//! - `VercelApi`: deploy and alias calls

mod error;
pub mod fakes;
pub mod github;
pub mod remote_traits;
pub mod vercel;

pub use error::RemoteError;
pub use github::{GitHubClient, GitHubConfig};
pub use remote_traits::{
    ensure_https, ChangeSource, CommentId, CommentPage, CommentStore, CommentTarget, DeployFile,
    DeploymentLedger, DeploymentRecordId, DeploymentState, DeploymentStatusEntry,
    DeploymentStatusUpdate, DeploymentSummary, NewDeployment, ProjectSettings, RemoteComment,
    RemoteResult, VercelApi, VercelDeployRequest, VercelDeployment, CHANGED_FILES_PAGE_SIZE,
    COMMENT_PAGE_SIZE,
};
pub use vercel::VercelClient;
