//! Structured observability hooks for previewbot run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via the `RunSpan` RAII guard
//! - Emission functions for each step: gate, deploy attempts, status
//!   transitions, comment decisions and writes
//!
//! Every event carries a stable `event` field so JSON logs can be filtered
//! without parsing messages.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::classify::ActionableError;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("acme/site", "abc123");
/// // every event below is tagged with repository and sha
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the repository and commit.
    pub fn enter(repository: &str, sha: &str) -> Self {
        let span = tracing::info_span!("previewbot.run", repository = %repository, sha = %sha);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: gate decision.
pub fn emit_gate_evaluated(allowed: bool, relevant: bool, reason: &str) {
    info!(
        event = "gate.evaluated",
        allowed = allowed,
        relevant = relevant,
        reason = %reason,
    );
}

/// Emit event: a retryable attempt failed and will be retried after `delay`.
pub fn emit_attempt_failed(
    operation: &str,
    attempt: u32,
    diagnosis: &ActionableError,
    delay: Duration,
) {
    warn!(
        event = "deploy.attempt_failed",
        operation = %operation,
        attempt = attempt,
        kind = %diagnosis.kind,
        delay_ms = delay.as_millis() as u64,
        message = %diagnosis.message,
    );
}

/// Emit the full diagnostic for a terminal failure.
pub fn emit_retry_exhausted(operation: &str, attempts: u32, diagnosis: &ActionableError) {
    error!(
        event = "deploy.failed",
        operation = %operation,
        attempts = attempts,
        kind = %diagnosis.kind,
        retryable = diagnosis.retryable,
        message = %diagnosis.message,
        suggestion = %diagnosis.suggestion,
    );
    for item in &diagnosis.action_items {
        error!(event = "deploy.action_item", operation = %operation, item = %item);
    }
}

/// Emit event: deployment created.
pub fn emit_deploy_completed(deployment_id: &str, url: &str, target: &str, files: usize) {
    info!(
        event = "deploy.completed",
        deployment_id = %deployment_id,
        url = %url,
        deploy_target = %target,
        files = files,
    );
}

/// Emit event: alias assigned to a deployment.
pub fn emit_alias_assigned(deployment_id: &str, alias: &str) {
    info!(event = "deploy.alias_assigned", deployment_id = %deployment_id, alias = %alias);
}

/// Emit event: deployment record transitioned.
pub fn emit_status_transition(record_id: u64, environment: &str, state: &str) {
    info!(
        event = "status.transition",
        record_id = record_id,
        environment = %environment,
        state = %state,
    );
}

/// Emit event: sticky comment decision.
pub fn emit_comment_decided(target: &str, decision: &str, previous_id: Option<&str>) {
    info!(
        event = "comment.decided",
        comment_target = %target,
        decision = %decision,
        previous_id = previous_id.unwrap_or(""),
    );
}

/// Emit event: sticky comment write performed.
pub fn emit_comment_written(target: &str, action: &str, comment_id: &str) {
    info!(
        event = "comment.written",
        comment_target = %target,
        action = %action,
        comment_id = %comment_id,
    );
}

/// Emit event: an auxiliary step failed and was skipped (warning level).
pub fn emit_best_effort_failed(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "best_effort.failed", step = %step, error = %error);
}
