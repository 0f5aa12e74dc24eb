//! Run configuration.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file,
//! then command-line flags and `INPUT_*` variables applied by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::deploy::parse_extra_metadata;
use crate::domain::{
    AliasSpec, DeploymentPolicy, DeploymentRequest, DeploymentTarget, PreviewError, Result,
};
use crate::retry::RetryConfig;
use crate::sticky::CommentOptions;

/// Vercel project and upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub project_id: String,
    /// Vercel team (org) id
    pub org_id: Option<String>,
    /// Deployment name; defaults to the repository name
    pub name: Option<String>,
    pub working_directory: PathBuf,
    /// Framework hint passed through as project settings
    pub framework: Option<String>,
    /// Explicit target override
    pub target: Option<DeploymentTarget>,
    /// Free-form `-m key=value` string
    pub extra_metadata: Option<String>,
    pub aliases: Vec<AliasSpec>,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            org_id: None,
            name: None,
            working_directory: PathBuf::from("."),
            framework: None,
            target: None,
            extra_metadata: None,
            aliases: Vec::new(),
        }
    }
}

impl DeploySettings {
    /// Turn settings into a request, parsing the extra metadata string.
    pub fn to_request(&self) -> Result<DeploymentRequest> {
        if self.project_id.trim().is_empty() {
            return Err(PreviewError::Configuration(
                "a Vercel project id is required".to_string(),
            ));
        }
        let metadata = match &self.extra_metadata {
            Some(raw) => parse_extra_metadata(raw)?,
            None => Default::default(),
        };
        Ok(DeploymentRequest {
            target: self.target,
            working_directory: self.working_directory.clone(),
            project_id: self.project_id.clone(),
            org_id: self.org_id.clone().filter(|o| !o.trim().is_empty()),
            name: self.name.clone(),
            framework: self.framework.clone(),
            alias_candidates: self.aliases.clone(),
            metadata,
        })
    }
}

/// Complete previewbot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub policy: DeploymentPolicy,
    pub comment: CommentOptions,
    pub deploy: DeploySettings,
    pub retry: RetryConfig,
    /// Post a sticky comment at all
    pub comment_enabled: bool,
    /// Post a comment when the gate skips the deployment
    pub comment_on_skip: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            policy: DeploymentPolicy::default(),
            comment: CommentOptions::default(),
            deploy: DeploySettings::default(),
            retry: RetryConfig::default(),
            comment_enabled: true,
            comment_on_skip: false,
        }
    }
}

impl PreviewConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PreviewError::Configuration(format!("invalid config: {}", e)))
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Split a newline- or comma-separated input into trimmed, non-empty items.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
