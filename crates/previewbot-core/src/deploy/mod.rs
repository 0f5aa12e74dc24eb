//! Deployment client.
//!
//! Collects the working directory into an inline file manifest, creates a
//! Vercel deployment under the retry executor, then assigns any alias
//! candidates that apply to the current branch.

pub mod alias;
pub mod files;
pub mod metadata;

use std::sync::Arc;

use remote_state::{ensure_https, ProjectSettings, RemoteError, VercelApi, VercelDeployRequest};
use tracing::info;

use crate::classify::{classify_deploy_error, ActionableError};
use crate::domain::{
    DeploymentRequest, DeploymentResult, DeploymentTarget, PreviewError, Result, RunContext,
};
use crate::obs;
use crate::retry::{execute_with_retry, RetryConfig, Sleeper, TokioSleeper};

pub use alias::{candidate_aliases, render_alias, slugify, ANY_BRANCH};
pub use files::{collect_files, manifest_digest, EXCLUDED_DIRS, LOCKFILE_PRECEDENCE};
pub use metadata::{build_metadata, parse_extra_metadata};

/// Metadata key carrying the manifest digest.
pub const MANIFEST_DIGEST_KEY: &str = "manifestDigest";

/// Resolve the deployment target: explicit override, else `main` is
/// production and everything else staging.
pub fn resolve_target(override_target: Option<DeploymentTarget>, branch: &str) -> DeploymentTarget {
    match override_target {
        Some(target) => target,
        None if branch == "main" => DeploymentTarget::Production,
        None => DeploymentTarget::Staging,
    }
}

/// Classify a Vercel failure by its rendered message.
pub fn classify_remote_deploy_error(err: &RemoteError) -> ActionableError {
    classify_deploy_error(&err.to_string())
}

/// Performs deployments against a [`VercelApi`].
pub struct DeploymentClient {
    vercel: Arc<dyn VercelApi>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl DeploymentClient {
    pub fn new(vercel: Arc<dyn VercelApi>) -> Self {
        Self {
            vercel,
            retry: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Build the Vercel request body for this run.
    pub fn build_request(
        &self,
        ctx: &RunContext,
        request: &DeploymentRequest,
    ) -> Result<(DeploymentTarget, VercelDeployRequest)> {
        if request.project_id.trim().is_empty() {
            return Err(PreviewError::Configuration(
                "a Vercel project id is required".to_string(),
            ));
        }

        let branch = ctx.branch();
        let target = resolve_target(request.target, &branch);

        let files = collect_files(&request.working_directory)?;
        if files.is_empty() {
            return Err(PreviewError::Configuration(format!(
                "no files to deploy under {}",
                request.working_directory.display()
            )));
        }

        let digest = manifest_digest(&files);
        info!(files = files.len(), manifest_digest = %digest, "Collected deployment manifest");

        let mut meta = build_metadata(ctx, &branch);
        meta.insert(MANIFEST_DIGEST_KEY.to_string(), digest);
        meta.extend(request.metadata.clone());

        let name = request.name.clone().unwrap_or_else(|| {
            ctx.repository
                .rsplit('/')
                .next()
                .filter(|n| !n.is_empty())
                .unwrap_or("preview")
                .to_string()
        });

        Ok((
            target,
            VercelDeployRequest {
                name,
                project: request.project_id.clone(),
                target: target.as_str().to_string(),
                files,
                meta,
                project_settings: ProjectSettings {
                    framework: request.framework.clone(),
                },
            },
        ))
    }

    /// Deploy, then assign aliases best-effort.
    ///
    /// The returned URL is the first successfully assigned alias containing
    /// a `.`, else the deployment's own URL.
    pub async fn deploy(
        &self,
        ctx: &RunContext,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult> {
        let (target, body) = self.build_request(ctx, request)?;
        let team = request.org_id.as_deref();

        let deployment = execute_with_retry(
            "vercel.deploy",
            &self.retry,
            self.sleeper.as_ref(),
            |_attempt| self.vercel.create_deployment(team, &body),
            classify_remote_deploy_error,
        )
        .await?;

        if deployment.url.trim().is_empty() {
            return Err(RemoteError::MissingDeploymentUrl.into());
        }
        obs::emit_deploy_completed(&deployment.id, &deployment.url, target.as_str(), body.files.len());

        let branch = ctx.branch();
        let mut assigned_aliases = Vec::new();
        for alias in candidate_aliases(&request.alias_candidates, &branch, ctx.pull_request_number()) {
            match self.vercel.assign_alias(team, &deployment.id, &alias).await {
                Ok(assigned) => {
                    obs::emit_alias_assigned(&deployment.id, &assigned);
                    assigned_aliases.push(assigned);
                }
                Err(err) => obs::emit_best_effort_failed("alias", &err),
            }
        }

        let url = assigned_aliases
            .iter()
            .find(|alias| alias.contains('.'))
            .map(|alias| ensure_https(alias))
            .unwrap_or_else(|| ensure_https(&deployment.url));

        Ok(DeploymentResult {
            url,
            id: deployment.id,
            assigned_aliases,
        })
    }
}
