//! Step outputs for the workflow runner.
//!
//! Outputs are appended to the file named by `GITHUB_OUTPUT` as
//! `key=value` lines. Multiline values use the runner's heredoc form.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use previewbot_core::CommentOutcome;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::pipeline::PipelineResult;

/// Values exposed to later workflow steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutputs {
    /// Sticky comment found before this run
    pub previous_comment_id: Option<String>,
    /// Comment created by this run
    pub created_comment_id: Option<String>,
    pub deployment_url: Option<String>,
    pub deployed: bool,
}

impl RunOutputs {
    pub fn from_result(result: &PipelineResult) -> Self {
        let mut outputs = result
            .comment
            .as_ref()
            .map(Self::from_comment)
            .unwrap_or_default();
        outputs.deployment_url = result.deployment_url().map(str::to_string);
        outputs.deployed = result.deployed();
        outputs
    }

    pub fn from_comment(outcome: &CommentOutcome) -> Self {
        Self {
            previous_comment_id: outcome.previous_id.as_ref().map(|id| id.node_id.clone()),
            created_comment_id: outcome.created_id.as_ref().map(|id| id.node_id.clone()),
            ..Self::default()
        }
    }

    /// Output lines in declaration order. Absent values are written empty.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "previous_comment_id",
                self.previous_comment_id.clone().unwrap_or_default(),
            ),
            (
                "created_comment_id",
                self.created_comment_id.clone().unwrap_or_default(),
            ),
            (
                "deployment_url",
                self.deployment_url.clone().unwrap_or_default(),
            ),
            ("deployed", self.deployed.to_string()),
        ]
    }

    /// Append every output to `path`.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut buf = String::new();
        for (key, value) in self.entries() {
            buf.push_str(&format_output(key, &value));
        }
        file.write_all(buf.as_bytes())
    }
}

/// Format one output entry.
pub fn format_output(key: &str, value: &str) -> String {
    if value.contains('\n') {
        let digest = hex::encode(Sha256::digest(value.as_bytes()));
        let delimiter = format!("previewbot_{}", &digest[..16]);
        format!("{key}<<{delimiter}\n{value}\n{delimiter}\n")
    } else {
        format!("{key}={value}\n")
    }
}
