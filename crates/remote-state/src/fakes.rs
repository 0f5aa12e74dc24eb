//! In-memory fakes for remote traits (testing only)
//!
//! Provides `MemoryCommentStore`, `MemoryDeploymentLedger`,
//! `MemoryChangeSource` and `MemoryVercel` that satisfy the trait contracts
//! without any network access. Every fake records its writes so tests can
//! assert on exactly what reached the "remote".

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::RemoteError;
use crate::remote_traits::*;

// ---------------------------------------------------------------------------
// MemoryCommentStore
// ---------------------------------------------------------------------------

/// A write that reached a [`MemoryCommentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentWrite {
    Create { id: CommentId, body: String },
    Update { id: CommentId, body: String },
    Delete { id: CommentId },
    Minimize { id: CommentId },
}

#[derive(Debug, Default)]
struct CommentState {
    comments: HashMap<CommentTarget, Vec<RemoteComment>>,
    writes: Vec<CommentWrite>,
    list_calls: usize,
    next_id: u64,
    fail_next_write: Option<(u16, String)>,
}

/// In-memory comment store keyed by [`CommentTarget`].
#[derive(Debug)]
pub struct MemoryCommentStore {
    viewer: String,
    page_size: usize,
    state: Mutex<CommentState>,
}

impl MemoryCommentStore {
    /// Store that authenticates as `viewer`.
    pub fn new(viewer: &str) -> Self {
        Self {
            viewer: viewer.to_string(),
            page_size: COMMENT_PAGE_SIZE as usize,
            state: Mutex::new(CommentState::default()),
        }
    }

    /// Use a smaller page size to exercise pagination.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Seed an existing comment (not recorded as a write).
    pub fn seed(&self, target: &CommentTarget, author: &str, body: &str, minimized: bool) -> CommentId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = CommentId::new(format!("IC_{}", state.next_id), Some(state.next_id));
        state
            .comments
            .entry(target.clone())
            .or_default()
            .push(RemoteComment {
                id: id.clone(),
                author_login: author.to_string(),
                is_minimized: minimized,
                body: body.to_string(),
            });
        id
    }

    /// Make the next mutating call fail with an HTTP error.
    pub fn fail_next_write(&self, status: u16, body: &str) {
        self.state.lock().unwrap().fail_next_write = Some((status, body.to_string()));
    }

    /// All writes so far, in order.
    pub fn writes(&self) -> Vec<CommentWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Number of `list_comments` calls so far.
    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    /// Current comments on a target.
    pub fn comments(&self, target: &CommentTarget) -> Vec<RemoteComment> {
        self.state
            .lock()
            .unwrap()
            .comments
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    fn take_failure(state: &mut CommentState) -> RemoteResult<()> {
        match state.fail_next_write.take() {
            Some((status, body)) => Err(RemoteError::Http { status, body }),
            None => Ok(()),
        }
    }

    fn find_mut<'a>(
        state: &'a mut CommentState,
        target: &CommentTarget,
        id: &CommentId,
    ) -> RemoteResult<&'a mut RemoteComment> {
        state
            .comments
            .get_mut(target)
            .and_then(|list| list.iter_mut().find(|c| &c.id == id))
            .ok_or_else(|| RemoteError::NotFound(format!("comment {}", id)))
    }
}

#[async_trait]
impl CommentStore for MemoryCommentStore {
    async fn viewer_login(&self) -> RemoteResult<String> {
        Ok(self.viewer.clone())
    }

    async fn list_comments(
        &self,
        target: &CommentTarget,
        cursor: Option<&str>,
    ) -> RemoteResult<CommentPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        let start: usize = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| RemoteError::Decode(format!("invalid cursor '{}'", c)))?,
            None => 0,
        };
        let all = state.comments.get(target).cloned().unwrap_or_default();
        let end = (start + self.page_size).min(all.len());
        let comments = all.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
        let next_cursor = if end < all.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(CommentPage {
            comments,
            next_cursor,
        })
    }

    async fn create_comment(&self, target: &CommentTarget, body: &str) -> RemoteResult<CommentId> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        state.next_id += 1;
        let id = CommentId::new(format!("IC_{}", state.next_id), Some(state.next_id));
        state
            .comments
            .entry(target.clone())
            .or_default()
            .push(RemoteComment {
                id: id.clone(),
                author_login: self.viewer.clone(),
                is_minimized: false,
                body: body.to_string(),
            });
        state.writes.push(CommentWrite::Create {
            id: id.clone(),
            body: body.to_string(),
        });
        Ok(id)
    }

    async fn update_comment(
        &self,
        target: &CommentTarget,
        id: &CommentId,
        body: &str,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        Self::find_mut(&mut state, target, id)?.body = body.to_string();
        state.writes.push(CommentWrite::Update {
            id: id.clone(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn delete_comment(&self, target: &CommentTarget, id: &CommentId) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        let list = state
            .comments
            .get_mut(target)
            .ok_or_else(|| RemoteError::NotFound(format!("comment {}", id)))?;
        let before = list.len();
        list.retain(|c| &c.id != id);
        if list.len() == before {
            return Err(RemoteError::NotFound(format!("comment {}", id)));
        }
        state.writes.push(CommentWrite::Delete { id: id.clone() });
        Ok(())
    }

    async fn minimize_comment(&self, target: &CommentTarget, id: &CommentId) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        Self::find_mut(&mut state, target, id)?.is_minimized = true;
        state.writes.push(CommentWrite::Minimize { id: id.clone() });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryDeploymentLedger
// ---------------------------------------------------------------------------

/// A deployment record held by [`MemoryDeploymentLedger`].
#[derive(Debug, Clone)]
pub struct StoredDeployment {
    pub id: DeploymentRecordId,
    pub request: NewDeployment,
    /// Status updates, oldest first
    pub statuses: Vec<DeploymentStatusUpdate>,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LedgerState {
    deployments: Vec<StoredDeployment>,
    next_id: u64,
    fail_creates: bool,
    fail_statuses: bool,
}

/// In-memory deployment ledger.
#[derive(Debug, Default)]
pub struct MemoryDeploymentLedger {
    state: Mutex<LedgerState>,
}

impl MemoryDeploymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create_deployment` call fail with HTTP 403.
    pub fn failing_creates(self) -> Self {
        self.state.lock().unwrap().fail_creates = true;
        self
    }

    /// Make every `create_status` call fail with HTTP 500.
    pub fn failing_statuses(self) -> Self {
        self.state.lock().unwrap().fail_statuses = true;
        self
    }

    /// Snapshot of every deployment record.
    pub fn deployments(&self) -> Vec<StoredDeployment> {
        self.state.lock().unwrap().deployments.clone()
    }
}

#[async_trait]
impl DeploymentLedger for MemoryDeploymentLedger {
    async fn create_deployment(
        &self,
        request: &NewDeployment,
    ) -> RemoteResult<DeploymentRecordId> {
        let mut state = self.state.lock().unwrap();
        if state.fail_creates {
            return Err(RemoteError::Http {
                status: 403,
                body: "Resource not accessible by integration".to_string(),
            });
        }
        state.next_id += 1;
        let id = DeploymentRecordId(state.next_id);
        state.deployments.push(StoredDeployment {
            id,
            request: request.clone(),
            statuses: Vec::new(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn create_status(
        &self,
        id: DeploymentRecordId,
        update: &DeploymentStatusUpdate,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_statuses {
            return Err(RemoteError::Http {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        let deployment = state
            .deployments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| RemoteError::NotFound(format!("deployment {}", id)))?;
        deployment.statuses.push(update.clone());
        Ok(())
    }

    async fn list_deployments(&self, environment: &str) -> RemoteResult<Vec<DeploymentSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .deployments
            .iter()
            .rev()
            .filter(|d| d.request.environment == environment)
            .map(|d| DeploymentSummary {
                id: d.id,
                environment: d.request.environment.clone(),
                git_ref: d.request.git_ref.clone(),
                created_at: d.created_at,
            })
            .collect())
    }

    async fn list_statuses(
        &self,
        id: DeploymentRecordId,
    ) -> RemoteResult<Vec<DeploymentStatusEntry>> {
        let state = self.state.lock().unwrap();
        let deployment = state
            .deployments
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| RemoteError::NotFound(format!("deployment {}", id)))?;
        Ok(deployment
            .statuses
            .iter()
            .rev()
            .map(|s| DeploymentStatusEntry {
                state: s.state,
                environment_url: s.environment_url.clone(),
                created_at: deployment.created_at,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryChangeSource
// ---------------------------------------------------------------------------

/// In-memory changed-file source.
#[derive(Debug, Default)]
pub struct MemoryChangeSource {
    pr_files: Vec<String>,
    comparisons: HashMap<(String, String), Vec<String>>,
    parents: HashMap<String, String>,
    failing: bool,
    calls: Mutex<Vec<String>>,
}

impl MemoryChangeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pr_files(mut self, files: &[&str]) -> Self {
        self.pr_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_comparison(mut self, base: &str, head: &str, files: &[&str]) -> Self {
        self.comparisons.insert(
            (base.to_string(), head.to_string()),
            files.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    pub fn with_parent(mut self, sha: &str, parent: &str) -> Self {
        self.parents.insert(sha.to_string(), parent.to_string());
        self
    }

    /// Every call fails with HTTP 502.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Calls made so far, rendered as short strings (`pr_files:2`, `compare:a...b`).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, call: String) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing {
            Err(RemoteError::Http {
                status: 502,
                body: "bad gateway".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChangeSource for MemoryChangeSource {
    async fn pull_request_files(&self, number: u64, page: u32) -> RemoteResult<Vec<String>> {
        self.check(format!("pr_files:{}:{}", number, page))?;
        let size = CHANGED_FILES_PAGE_SIZE as usize;
        let start = (page.saturating_sub(1) as usize) * size;
        Ok(self
            .pr_files
            .iter()
            .skip(start)
            .take(size)
            .cloned()
            .collect())
    }

    async fn compare_files(&self, base: &str, head: &str) -> RemoteResult<Vec<String>> {
        self.check(format!("compare:{}...{}", base, head))?;
        self.comparisons
            .get(&(base.to_string(), head.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("comparison {}...{}", base, head)))
    }

    async fn commit_parent(&self, sha: &str) -> RemoteResult<Option<String>> {
        self.check(format!("parent:{}", sha))?;
        Ok(self.parents.get(sha).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryVercel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct VercelState {
    failures: VecDeque<RemoteError>,
    requests: Vec<VercelDeployRequest>,
    alias_calls: Vec<(String, String)>,
    next_id: u64,
}

/// In-memory Vercel API.
///
/// Deployments succeed with `https://{project}-{n}.vercel.app` unless a
/// failure was queued with [`MemoryVercel::push_failure`].
#[derive(Debug, Default)]
pub struct MemoryVercel {
    state: Mutex<VercelState>,
    rejected_aliases: HashSet<String>,
    omit_url: bool,
}

impl MemoryVercel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next deploy attempt.
    pub fn push_failure(&self, error: RemoteError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// Reject alias assignment for a domain.
    pub fn rejecting_alias(mut self, alias: &str) -> Self {
        self.rejected_aliases.insert(alias.to_string());
        self
    }

    /// Deployments succeed at the HTTP level but carry no URL.
    pub fn without_url(mut self) -> Self {
        self.omit_url = true;
        self
    }

    /// Number of deploy attempts so far.
    pub fn deploy_attempts(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.requests.len()
    }

    /// Deploy requests received, in order.
    pub fn requests(&self) -> Vec<VercelDeployRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// `(deployment_id, alias)` pairs requested, in order.
    pub fn alias_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().alias_calls.clone()
    }
}

#[async_trait]
impl VercelApi for MemoryVercel {
    async fn create_deployment(
        &self,
        _team_id: Option<&str>,
        request: &VercelDeployRequest,
    ) -> RemoteResult<VercelDeployment> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        if self.omit_url {
            return Err(RemoteError::MissingDeploymentUrl);
        }
        state.next_id += 1;
        Ok(VercelDeployment {
            id: format!("dpl_{}", state.next_id),
            url: format!("https://{}-{}.vercel.app", request.name, state.next_id),
        })
    }

    async fn assign_alias(
        &self,
        _team_id: Option<&str>,
        deployment_id: &str,
        alias: &str,
    ) -> RemoteResult<String> {
        self.state
            .lock()
            .unwrap()
            .alias_calls
            .push((deployment_id.to_string(), alias.to_string()));
        if self.rejected_aliases.contains(alias) {
            return Err(RemoteError::Http {
                status: 409,
                body: format!("alias {} is already in use", alias),
            });
        }
        Ok(alias.to_string())
    }
}
