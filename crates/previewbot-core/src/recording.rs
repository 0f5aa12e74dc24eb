//! Deployment status recorder: brackets a deployment with a GitHub
//! deployment record.
//!
//! Usage:
//! 1. [`DeploymentRecorder::begin`] creates the record and moves it to `in_progress`.
//! 2. [`DeploymentRecorder::complete`] posts the single terminal state.
//!
//! Every call is best-effort. Failures are logged and reported as `None`
//! (or ignored) so they never abort the pipeline.

use std::sync::Arc;

use remote_state::{
    DeploymentLedger, DeploymentRecordId, DeploymentState, DeploymentStatusUpdate, NewDeployment,
};

use crate::domain::{DeploymentTarget, RunContext};
use crate::obs;

/// Environment name for status tracking: `production` or `preview/<branch>`.
pub fn environment_name(target: DeploymentTarget, branch: &str) -> String {
    match target {
        DeploymentTarget::Production => "production".to_string(),
        DeploymentTarget::Staging => format!("preview/{}", branch),
    }
}

/// Records the lifecycle of one deployment.
pub struct DeploymentRecorder {
    ledger: Arc<dyn DeploymentLedger>,
    git_ref: String,
    log_url: Option<String>,
}

/// A record created by [`DeploymentRecorder::begin`].
///
/// Not `Clone`: [`DeploymentRecorder::complete`] consumes it, so a record
/// reaches a terminal state at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct ActiveRecord {
    pub id: DeploymentRecordId,
    pub environment: String,
}

impl DeploymentRecorder {
    pub fn new(ledger: Arc<dyn DeploymentLedger>, ctx: &RunContext) -> Self {
        Self {
            ledger,
            git_ref: ctx.sha.clone(),
            log_url: ctx.run_url.clone(),
        }
    }

    /// Create a record for `environment` and mark it `in_progress`.
    pub async fn begin(&self, environment: &str) -> Option<ActiveRecord> {
        let production = environment == "production";
        let request = NewDeployment {
            git_ref: self.git_ref.clone(),
            environment: environment.to_string(),
            transient: !production,
            production,
            description: format!("Deploying to {}", environment),
        };

        let id = match self.ledger.create_deployment(&request).await {
            Ok(id) => id,
            Err(err) => {
                obs::emit_best_effort_failed("status.create", &err);
                return None;
            }
        };
        obs::emit_status_transition(id.0, environment, DeploymentState::Pending.as_str());

        let record = ActiveRecord {
            id,
            environment: environment.to_string(),
        };
        self.post(&record, DeploymentState::InProgress, "Deployment started", None)
            .await;
        Some(record)
    }

    /// Post the terminal state, consuming the record.
    ///
    /// A non-terminal state posts nothing and hands the record back.
    pub async fn complete(
        &self,
        record: ActiveRecord,
        state: DeploymentState,
        description: &str,
        url: Option<&str>,
    ) -> Option<ActiveRecord> {
        if !state.is_terminal() {
            obs::emit_best_effort_failed(
                "status.complete",
                &format!("'{}' is not a terminal state", state),
            );
            return Some(record);
        }
        self.post(&record, state, description, url).await;
        None
    }

    async fn post(
        &self,
        record: &ActiveRecord,
        state: DeploymentState,
        description: &str,
        url: Option<&str>,
    ) {
        let update = DeploymentStatusUpdate {
            state,
            description: truncate_description(description),
            environment_url: url.map(str::to_string),
            log_url: self.log_url.clone(),
        };
        match self.ledger.create_status(record.id, &update).await {
            Ok(()) => obs::emit_status_transition(record.id.0, &record.environment, state.as_str()),
            Err(err) => obs::emit_best_effort_failed("status.update", &err),
        }
    }

    /// URL of the most recent successful deployment in `environment`.
    pub async fn latest_success_url(&self, environment: &str) -> Option<String> {
        let deployments = match self.ledger.list_deployments(environment).await {
            Ok(d) => d,
            Err(err) => {
                obs::emit_best_effort_failed("status.lookup", &err);
                return None;
            }
        };
        for deployment in deployments {
            match self.ledger.list_statuses(deployment.id).await {
                Ok(statuses) => {
                    if let Some(url) = statuses
                        .into_iter()
                        .find(|s| s.state == DeploymentState::Success)
                        .and_then(|s| s.environment_url)
                    {
                        return Some(url);
                    }
                }
                Err(err) => {
                    obs::emit_best_effort_failed("status.lookup", &err);
                    return None;
                }
            }
        }
        None
    }
}

/// GitHub rejects status descriptions over 140 characters.
fn truncate_description(description: &str) -> String {
    const MAX: usize = 140;
    if description.chars().count() <= MAX {
        description.to_string()
    } else {
        let mut out: String = description.chars().take(MAX - 3).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_state::fakes::MemoryDeploymentLedger;

    fn ctx() -> RunContext {
        RunContext::from_lookup(|k| match k {
            "GITHUB_SHA" => Some("abc".to_string()),
            _ => None,
        })
    }

    #[test]
    fn test_environment_name() {
        assert_eq!(environment_name(DeploymentTarget::Production, "main"), "production");
        assert_eq!(
            environment_name(DeploymentTarget::Staging, "feature/x"),
            "preview/feature/x"
        );
    }

    #[tokio::test]
    async fn test_begin_then_complete() {
        let ledger = Arc::new(MemoryDeploymentLedger::new());
        let recorder = DeploymentRecorder::new(ledger.clone(), &ctx());

        let record = recorder.begin("preview/dev").await.unwrap();
        let rest = recorder
            .complete(record, DeploymentState::Success, "Deployed", Some("https://x.example.com"))
            .await;
        assert!(rest.is_none());

        let stored = ledger.deployments();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].request.transient);
        assert!(!stored[0].request.production);
        let states: Vec<_> = stored[0].statuses.iter().map(|s| s.state).collect();
        assert_eq!(states, vec![DeploymentState::InProgress, DeploymentState::Success]);
        assert_eq!(
            stored[0].statuses[1].environment_url.as_deref(),
            Some("https://x.example.com")
        );
    }

    #[tokio::test]
    async fn test_production_is_not_transient() {
        let ledger = Arc::new(MemoryDeploymentLedger::new());
        let recorder = DeploymentRecorder::new(ledger.clone(), &ctx());
        recorder.begin("production").await.unwrap();
        let stored = ledger.deployments();
        assert!(!stored[0].request.transient);
        assert!(stored[0].request.production);
    }

    #[tokio::test]
    async fn test_create_failure_is_swallowed() {
        let ledger = Arc::new(MemoryDeploymentLedger::new().failing_creates());
        let recorder = DeploymentRecorder::new(ledger, &ctx());
        assert!(recorder.begin("production").await.is_none());
    }

    #[tokio::test]
    async fn test_record_completes_once() {
        let ledger = Arc::new(MemoryDeploymentLedger::new());
        let recorder = DeploymentRecorder::new(ledger.clone(), &ctx());
        let record = recorder.begin("production").await.unwrap();
        let record = recorder
            .complete(record, DeploymentState::Pending, "again", None)
            .await
            .expect("non-terminal state hands the record back");
        assert_eq!(ledger.deployments()[0].statuses.len(), 1);

        // The returned record can still reach its terminal state, exactly once.
        assert!(recorder
            .complete(record, DeploymentState::Failure, "failed", None)
            .await
            .is_none());
        let states: Vec<_> = ledger.deployments()[0]
            .statuses
            .iter()
            .map(|s| s.state)
            .collect();
        assert_eq!(states, vec![DeploymentState::InProgress, DeploymentState::Failure]);
    }

    #[test]
    fn test_truncate_description() {
        let long = "x".repeat(200);
        assert_eq!(truncate_description(&long).chars().count(), 140);
        assert_eq!(truncate_description("short"), "short");
    }
}
