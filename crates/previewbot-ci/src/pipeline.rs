//! Preview run orchestration.
//!
//! One run is: gate, deploy, record status, comment. Only a gate
//! configuration error or invalid deploy settings abort the run; a failed
//! deployment is reported through [`PipelineResult::error`] and the
//! comment.

use std::sync::Arc;

use anyhow::Context;
use previewbot_core::deploy::classify_remote_deploy_error;
use previewbot_core::{
    classify_deploy_error, environment_name, evaluate_gate, render_comment, resolve_target,
    ActionableError, CommentOutcome, DeploymentClient, DeploymentRecorder, DeploymentResult,
    DeploymentState, GateDecision, PreviewConfig, PreviewError, RunContext, RunOutcome, RunSpan,
    Sleeper, StickyCommentManager, TokioSleeper,
};
use remote_state::{ChangeSource, CommentStore, DeploymentLedger, VercelApi};
use tracing::{info, warn};

/// Remote systems a run talks to.
#[derive(Clone)]
pub struct PipelineDeps {
    pub comments: Arc<dyn CommentStore>,
    pub ledger: Arc<dyn DeploymentLedger>,
    pub changes: Arc<dyn ChangeSource>,
    pub vercel: Arc<dyn VercelApi>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl PipelineDeps {
    pub fn new(
        comments: Arc<dyn CommentStore>,
        ledger: Arc<dyn DeploymentLedger>,
        changes: Arc<dyn ChangeSource>,
        vercel: Arc<dyn VercelApi>,
    ) -> Self {
        Self {
            comments,
            ledger,
            changes,
            vercel,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }
}

/// Result of a complete preview run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub gate: GateDecision,

    /// Set when the deployment succeeded.
    pub deployment: Option<DeploymentResult>,

    /// Status environment, when the gate let the run through.
    pub environment: Option<String>,

    /// Sticky comment outcome, if a comment was attempted and succeeded.
    pub comment: Option<CommentOutcome>,

    /// Diagnosis of a failed deployment.
    pub error: Option<ActionableError>,
}

impl PipelineResult {
    pub fn deployed(&self) -> bool {
        self.deployment.is_some()
    }

    pub fn deployment_url(&self) -> Option<&str> {
        self.deployment.as_ref().map(|d| d.url.as_str())
    }

    fn skipped(gate: GateDecision) -> Self {
        Self {
            gate,
            deployment: None,
            environment: None,
            comment: None,
            error: None,
        }
    }
}

/// Preview pipeline orchestrator.
pub struct PreviewPipeline;

impl PreviewPipeline {
    /// Execute one preview run.
    ///
    /// Status records and comments are best-effort: their failures are
    /// logged and never change the deployment outcome.
    pub async fn run(
        ctx: &RunContext,
        config: &PreviewConfig,
        deps: &PipelineDeps,
    ) -> anyhow::Result<PipelineResult> {
        let _span = RunSpan::enter(&ctx.repository, &ctx.sha);
        let branch = ctx.branch();

        let gate = evaluate_gate(ctx, &config.policy, deps.changes.as_ref())
            .await
            .context("gate evaluation failed")?;

        let recorder = DeploymentRecorder::new(deps.ledger.clone(), ctx);

        if !gate.should_deploy() {
            info!(branch = %branch, reason = %gate.reason, "Deployment skipped");
            let mut result = PipelineResult::skipped(gate);
            if config.comment_enabled && config.comment_on_skip {
                let target = resolve_target(config.deploy.target, &branch);
                let environment = environment_name(target, &branch);
                let last_url = recorder.latest_success_url(&environment).await;
                let outcome = RunOutcome::Skipped {
                    reason: result.gate.reason.clone(),
                    last_url,
                };
                result.comment = post_comment(ctx, config, deps, &outcome).await;
            }
            return Ok(result);
        }

        let request = config
            .deploy
            .to_request()
            .context("invalid deploy settings")?;
        let target = resolve_target(request.target, &branch);
        let environment = environment_name(target, &branch);
        info!(branch = %branch, deploy_target = %target, environment = %environment, "Deploying");

        let record = recorder.begin(&environment).await;

        let client = DeploymentClient::new(deps.vercel.clone())
            .with_retry(config.retry.clone())
            .with_sleeper(deps.sleeper.clone());

        let (outcome, deployment, error) = match client.deploy(ctx, &request).await {
            Ok(result) => {
                if let Some(record) = record {
                    recorder
                        .complete(
                            record,
                            DeploymentState::Success,
                            "Deployment finished",
                            Some(&result.url),
                        )
                        .await;
                }
                let outcome = RunOutcome::Deployed {
                    result: result.clone(),
                    target,
                    environment: environment.clone(),
                };
                (outcome, Some(result), None)
            }
            Err(err) => {
                let diagnosis = diagnose(&err);
                if let Some(record) = record {
                    recorder
                        .complete(record, DeploymentState::Failure, &diagnosis.suggestion, None)
                        .await;
                }
                let outcome = RunOutcome::Failed {
                    diagnosis: diagnosis.clone(),
                };
                (outcome, None, Some(diagnosis))
            }
        };

        let comment = if config.comment_enabled {
            post_comment(ctx, config, deps, &outcome).await
        } else {
            None
        };

        Ok(PipelineResult {
            gate,
            deployment,
            environment: Some(environment),
            comment,
            error,
        })
    }
}

fn diagnose(err: &PreviewError) -> ActionableError {
    match err.as_remote() {
        Some(remote) => classify_remote_deploy_error(remote),
        None => classify_deploy_error(&err.to_string()),
    }
}

async fn post_comment(
    ctx: &RunContext,
    config: &PreviewConfig,
    deps: &PipelineDeps,
    outcome: &RunOutcome,
) -> Option<CommentOutcome> {
    let target = ctx.comment_target();
    let body = render_comment(ctx, outcome);
    let manager = StickyCommentManager::new(deps.comments.clone(), config.comment.clone());
    match manager.upsert(&target, &body).await {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            warn!(comment_target = %target, error = %err, "Failed to write sticky comment");
            None
        }
    }
}
