//! Failure classification.
//!
//! Turns raw deploy and API failures into an [`ActionableError`]: a tagged
//! diagnosis with remediation text and a retry verdict. Both classifiers are
//! pure and total.

use serde::{Deserialize, Serialize};

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Deployment,
    Authentication,
    Configuration,
    ApiLimit,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Deployment => "deployment",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Configuration => "configuration",
            ErrorKind::ApiLimit => "api_limit",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with remediation guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionableError {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: String,
    pub action_items: Vec<String>,
    pub retryable: bool,
}

impl ActionableError {
    fn new(
        kind: ErrorKind,
        message: &str,
        suggestion: &str,
        action_items: &[&str],
        retryable: bool,
    ) -> Self {
        Self {
            kind,
            message: message.to_string(),
            suggestion: suggestion.to_string(),
            action_items: action_items.iter().map(|s| s.to_string()).collect(),
            retryable,
        }
    }
}

impl std::fmt::Display for ActionableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Classify a deploy failure by its message. First match wins.
pub fn classify_deploy_error(message: &str) -> ActionableError {
    let lower = message.to_lowercase();

    if lower.contains("project not found") {
        return ActionableError::new(
            ErrorKind::Configuration,
            message,
            "The Vercel project could not be found with the configured ids.",
            &[
                "Check that the project id matches the Vercel project settings",
                "Check that the org id owns the project",
                "Make sure the token has access to the team",
            ],
            false,
        );
    }
    if lower.contains("rate limit") {
        return ActionableError::new(
            ErrorKind::ApiLimit,
            message,
            "The Vercel API rate limit was hit.",
            &[
                "Wait for the limit window to reset",
                "Reduce concurrent deployments for this project",
            ],
            true,
        );
    }
    if lower.contains("build failed") {
        return ActionableError::new(
            ErrorKind::Deployment,
            message,
            "The remote build failed.",
            &[
                "Open the Vercel build log for this deployment",
                "Reproduce the build locally",
            ],
            true,
        );
    }
    ActionableError::new(
        ErrorKind::Unknown,
        message,
        "An unexpected error occurred during deployment.",
        &["Inspect the run log for the raw error"],
        true,
    )
}

/// Classify a GitHub API failure by HTTP status.
pub fn classify_api_error(status: Option<u16>, message: &str) -> ActionableError {
    match status {
        Some(403) => ActionableError::new(
            ErrorKind::Authentication,
            message,
            "The token lacks permission for this operation.",
            &[
                "Grant the workflow `pull-requests: write` and `deployments: write`",
                "Provide a fallback token with the required scopes",
            ],
            true,
        ),
        Some(404) => ActionableError::new(
            ErrorKind::Configuration,
            message,
            "The requested repository resource does not exist.",
            &["Check the repository name and pull request number"],
            false,
        ),
        _ => ActionableError::new(
            ErrorKind::Unknown,
            message,
            "The GitHub API call failed.",
            &["Inspect the run log for the raw error"],
            true,
        ),
    }
}
