//! Domain models for previewbot.
//!
//! - `RunContext`: the immutable description of the triggering CI event
//! - `DeploymentPolicy`, `DeploymentRequest`, `DeploymentResult`: what to deploy and what came back
//! - `PreviewError`: the crate-wide error taxonomy

pub mod context;
pub mod deployment;
pub mod error;

pub use context::{resolve_branch, EventKind, PullRequestInfo, RunContext, ZERO_SHA};
pub use deployment::{
    AliasSpec, ChangeSet, DeploymentPolicy, DeploymentRequest, DeploymentResult, DeploymentTarget,
};
pub use error::{PreviewError, Result};
