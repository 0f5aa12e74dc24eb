//! Sticky comment manager.
//!
//! Re-reads the target's comments immediately before acting, reuses the
//! first matching comment and performs at most one content write per run.

use std::sync::Arc;

use remote_state::{CommentId, CommentStore, CommentTarget, RemoteComment};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::markers::{decide, CommentDecision, DecisionOptions, Markers};
use crate::domain::Result;
use crate::obs;

/// Stop paging after this many pages; GitHub caps listings long before.
const MAX_COMMENT_PAGES: usize = 1000;

/// How an existing sticky comment is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentMode {
    /// Update the found comment, create one otherwise
    #[default]
    Upsert,
    /// Never touch an existing comment
    OnlyCreate,
    /// Never create a comment
    OnlyUpdate,
    /// Delete the found comment and post a fresh one
    Recreate,
    /// Minimize the found comment as outdated and post a fresh one
    HideAndRecreate,
}

impl std::str::FromStr for CommentMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().replace('-', "_").as_str() {
            "upsert" => Ok(CommentMode::Upsert),
            "only_create" => Ok(CommentMode::OnlyCreate),
            "only_update" => Ok(CommentMode::OnlyUpdate),
            "recreate" => Ok(CommentMode::Recreate),
            "hide_and_recreate" => Ok(CommentMode::HideAndRecreate),
            other => Err(format!("unknown comment mode '{}'", other)),
        }
    }
}

/// Sticky comment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentOptions {
    /// Marker key; runs with different headers keep separate comments
    pub header: String,
    pub append: bool,
    pub hide_details: bool,
    pub skip_unchanged: bool,
    pub ignore_empty: bool,
    /// Login whose comments are reused; defaults to the authenticated viewer
    pub author: Option<String>,
    pub mode: CommentMode,
}

impl Default for CommentOptions {
    fn default() -> Self {
        Self {
            header: "preview".to_string(),
            append: false,
            hide_details: false,
            skip_unchanged: false,
            ignore_empty: false,
            author: None,
            mode: CommentMode::Upsert,
        }
    }
}

impl CommentOptions {
    fn decision_options(&self) -> DecisionOptions {
        DecisionOptions {
            append: self.append,
            hide_details: self.hide_details,
            skip_unchanged: self.skip_unchanged,
            ignore_empty: self.ignore_empty,
        }
    }
}

/// Why no write happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Empty,
    Unchanged,
    /// The comment mode forbids the write the decision asked for
    Mode,
}

/// The write performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAction {
    Created,
    Updated,
    Recreated,
    HiddenAndCreated,
    Skipped(SkipReason),
}

/// Result of one [`StickyCommentManager::upsert`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentOutcome {
    /// The sticky comment found before acting
    pub previous_id: Option<CommentId>,
    /// A comment created by this call
    pub created_id: Option<CommentId>,
    pub action: CommentAction,
}

/// Compare logins ignoring case and a trailing `[bot]`.
pub fn same_identity(a: &str, b: &str) -> bool {
    fn normalize(login: &str) -> String {
        let login = login.trim();
        login
            .strip_suffix("[bot]")
            .unwrap_or(login)
            .to_lowercase()
    }
    normalize(a) == normalize(b)
}

/// Finds and maintains the single sticky comment for a header.
pub struct StickyCommentManager {
    store: Arc<dyn CommentStore>,
    options: CommentOptions,
    markers: Markers,
}

impl StickyCommentManager {
    pub fn new(store: Arc<dyn CommentStore>, options: CommentOptions) -> Self {
        let markers = Markers::new(&options.header);
        Self {
            store,
            options,
            markers,
        }
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn options(&self) -> &CommentOptions {
        &self.options
    }

    /// The configured author, else every login the store writes as.
    async fn identities(&self) -> Result<Vec<String>> {
        match &self.options.author {
            Some(author) if !author.trim().is_empty() => Ok(vec![author.clone()]),
            _ => Ok(self.store.identities().await?),
        }
    }

    /// First non-minimized comment by one of our identities carrying the
    /// start marker, scanning every page.
    pub async fn find(&self, target: &CommentTarget) -> Result<Option<RemoteComment>> {
        let identities = self.identities().await?;
        let mut cursor: Option<String> = None;

        for page_index in 0..MAX_COMMENT_PAGES {
            let page = self.store.list_comments(target, cursor.as_deref()).await?;
            debug!(page = page_index + 1, comments = page.comments.len(), "Scanning comments");

            if let Some(found) = page.comments.into_iter().find(|c| {
                !c.is_minimized
                    && identities
                        .iter()
                        .any(|login| same_identity(&c.author_login, login))
                    && self.markers.is_marked(&c.body)
            }) {
                return Ok(Some(found));
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(None)
    }

    /// Create or update the sticky comment with `body`.
    pub async fn upsert(&self, target: &CommentTarget, body: &str) -> Result<CommentOutcome> {
        let existing = self.find(target).await?;
        let previous_id = existing.as_ref().map(|c| c.id.clone());

        let decision = decide(
            &self.markers,
            existing.as_ref().map(|c| c.body.as_str()),
            body,
            self.options.decision_options(),
        );
        let target_label = target.to_string();
        obs::emit_comment_decided(
            &target_label,
            decision.as_str(),
            previous_id.as_ref().map(|id| id.node_id.as_str()),
        );

        let mut outcome = CommentOutcome {
            previous_id,
            created_id: None,
            action: CommentAction::Skipped(SkipReason::Mode),
        };

        match (decision, existing) {
            (CommentDecision::SkipEmpty, _) => {
                if !self.options.ignore_empty {
                    warn!(comment_target = %target_label, "Comment body is empty; nothing posted");
                }
                outcome.action = CommentAction::Skipped(SkipReason::Empty);
            }
            (CommentDecision::SkipUnchanged, _) => {
                outcome.action = CommentAction::Skipped(SkipReason::Unchanged);
            }
            (CommentDecision::Create { body }, _) => {
                if self.options.mode == CommentMode::OnlyUpdate {
                    debug!(comment_target = %target_label, "No sticky comment to update");
                } else {
                    let id = self.store.create_comment(target, &body).await?;
                    obs::emit_comment_written(&target_label, "create", &id.node_id);
                    outcome.created_id = Some(id);
                    outcome.action = CommentAction::Created;
                }
            }
            (CommentDecision::Update { body: merged }, Some(current)) => match self.options.mode {
                CommentMode::Upsert | CommentMode::OnlyUpdate => {
                    self.store.update_comment(target, &current.id, &merged).await?;
                    obs::emit_comment_written(&target_label, "update", &current.id.node_id);
                    outcome.action = CommentAction::Updated;
                }
                CommentMode::OnlyCreate => {
                    debug!(comment_target = %target_label, "Sticky comment exists; not updating");
                }
                CommentMode::Recreate => {
                    self.store.delete_comment(target, &current.id).await?;
                    obs::emit_comment_written(&target_label, "delete", &current.id.node_id);
                    let id = self.store.create_comment(target, &merged).await?;
                    obs::emit_comment_written(&target_label, "create", &id.node_id);
                    outcome.created_id = Some(id);
                    outcome.action = CommentAction::Recreated;
                }
                CommentMode::HideAndRecreate => {
                    self.store.minimize_comment(target, &current.id).await?;
                    obs::emit_comment_written(&target_label, "minimize", &current.id.node_id);
                    let id = self
                        .store
                        .create_comment(target, &self.markers.wrap(body))
                        .await?;
                    obs::emit_comment_written(&target_label, "create", &id.node_id);
                    outcome.created_id = Some(id);
                    outcome.action = CommentAction::HiddenAndCreated;
                }
            },
            (CommentDecision::Update { .. }, None) => {
                // decide() only yields Update when a previous body exists
                outcome.action = CommentAction::Skipped(SkipReason::Mode);
            }
        }

        Ok(outcome)
    }
}
