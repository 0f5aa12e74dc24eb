//! previewbot core library
//!
//! Domain logic for gated preview deployments: the policy/change gate,
//! the retrying Vercel deployment client with typed failure diagnosis,
//! GitHub deployment-status bookkeeping, and the sticky comment protocol.

pub mod classify;
pub mod config;
pub mod deploy;
pub mod domain;
pub mod gate;
pub mod glob;
pub mod obs;
pub mod recording;
pub mod render;
pub mod retry;
pub mod sticky;
pub mod telemetry;

pub use classify::{classify_api_error, classify_deploy_error, ActionableError, ErrorKind};
pub use config::{split_list, DeploySettings, PreviewConfig};
pub use deploy::{resolve_target, slugify, DeploymentClient};
pub use domain::{
    resolve_branch, AliasSpec, ChangeSet, DeploymentPolicy, DeploymentRequest, DeploymentResult,
    DeploymentTarget, EventKind, PreviewError, PullRequestInfo, Result, RunContext,
};
pub use gate::{change_set, evaluate as evaluate_gate, is_relevant, should_deploy, GateDecision};
pub use glob::{glob_match, GlobPattern};
pub use obs::{
    emit_alias_assigned, emit_attempt_failed, emit_best_effort_failed, emit_comment_decided,
    emit_comment_written, emit_deploy_completed, emit_gate_evaluated, emit_retry_exhausted,
    emit_status_transition, RunSpan,
};
pub use recording::{environment_name, ActiveRecord, DeploymentRecorder};
pub use render::{render_comment, RunOutcome};
pub use retry::{execute_with_retry, RecordingSleeper, RetryConfig, Sleeper, TokioSleeper};
pub use sticky::{
    CommentAction, CommentDecision, CommentMode, CommentOptions, CommentOutcome, Markers,
    SkipReason, StickyCommentManager,
};
pub use telemetry::{default_directives, init_tracing, LogFormat};

pub use remote_state::{CommentId, CommentTarget, DeploymentState};
