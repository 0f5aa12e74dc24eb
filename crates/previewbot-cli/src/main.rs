//! previewbot - gated preview deployments with one sticky status comment
//!
//! ## Commands
//!
//! - `run`: gate, deploy to Vercel, record the GitHub deployment, comment
//! - `gate`: print the gate decision (exit 0 to deploy, 78 to skip)
//! - `comment`: post or update the sticky comment with a given body
//!
//! Every flag can also be supplied through the matching `INPUT_*`
//! variable, so the binary runs unchanged as a workflow step.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use previewbot_ci::{FallbackCommentStore, PipelineDeps, PreviewPipeline, RunOutputs};
use previewbot_core::{
    evaluate_gate, split_list, AliasSpec, CommentMode, DeploymentTarget, LogFormat,
    PreviewConfig, RunContext, StickyCommentManager,
};
use remote_state::{CommentStore, GitHubClient, GitHubConfig, VercelClient};
use serde_json::Value;
use tracing::{info, warn, Level};

/// Exit status a skipped gate reports, so workflows can branch on it.
const EXIT_SKIPPED: u8 = 78;

#[derive(Parser)]
#[command(name = "previewbot")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Gated preview deployments with a single sticky status comment", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file; flags and INPUT_* variables override it
    #[arg(long, global = true, env = "INPUT_CONFIG")]
    config: Option<PathBuf>,

    /// File that receives step outputs
    #[arg(long, global = true, env = "GITHUB_OUTPUT")]
    output_file: Option<PathBuf>,

    #[command(flatten)]
    github: GitHubArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: gate, deploy, record status, comment
    Run {
        #[command(flatten)]
        policy: PolicyArgs,

        #[command(flatten)]
        deploy: DeployArgs,

        #[command(flatten)]
        comment: CommentArgs,
    },

    /// Evaluate the gate and print the decision
    Gate {
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Post the sticky comment with a given body
    Comment {
        /// Comment body
        #[arg(long, env = "INPUT_MESSAGE", conflicts_with = "body_file")]
        body: Option<String>,

        /// Read the comment body from a file
        #[arg(long, env = "INPUT_PATH")]
        body_file: Option<PathBuf>,

        #[command(flatten)]
        comment: CommentArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct GitHubArgs {
    /// Token for the GitHub API
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Token retried once when the primary token is rejected for comments
    #[arg(long, global = true, env = "INPUT_FALLBACK_TOKEN", hide_env_values = true)]
    fallback_token: Option<String>,

    /// GitHub API base URL
    #[arg(long, global = true, env = "GITHUB_API_URL")]
    github_api_url: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
struct PolicyArgs {
    /// Branches whose pushes deploy (newline or comma separated)
    #[arg(long, env = "INPUT_PUSH_BRANCHES")]
    push_branches: Option<String>,

    /// PR base branches that deploy (newline or comma separated)
    #[arg(long, env = "INPUT_PR_BASE_BRANCHES")]
    pr_base_branches: Option<String>,

    /// Globs of paths that make a change relevant
    #[arg(long, env = "INPUT_CHANGE_GLOBS")]
    change_globs: Option<String>,

    /// Only deploy when a changed file matches a glob
    #[arg(long, env = "INPUT_ONLY_IF_CHANGED")]
    only_if_changed: Option<bool>,
}

impl PolicyArgs {
    fn apply(&self, config: &mut PreviewConfig) {
        if let Some(raw) = &self.push_branches {
            config.policy.push_branches = split_list(raw).into_iter().collect();
        }
        if let Some(raw) = &self.pr_base_branches {
            config.policy.pr_base_branches = split_list(raw).into_iter().collect();
        }
        if let Some(raw) = &self.change_globs {
            config.policy.change_globs = split_list(raw);
        }
        if let Some(only) = self.only_if_changed {
            config.policy.only_if_changed = only;
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct DeployArgs {
    /// Vercel API token
    #[arg(long, env = "INPUT_VERCEL_TOKEN", hide_env_values = true)]
    vercel_token: Option<String>,

    /// Vercel project id
    #[arg(long, env = "INPUT_VERCEL_PROJECT_ID")]
    project_id: Option<String>,

    /// Vercel team (org) id
    #[arg(long, env = "INPUT_VERCEL_ORG_ID")]
    org_id: Option<String>,

    /// Deployment name (default: repository name)
    #[arg(long, env = "INPUT_VERCEL_PROJECT_NAME")]
    name: Option<String>,

    /// Directory to upload
    #[arg(long, env = "INPUT_WORKING_DIRECTORY")]
    working_directory: Option<PathBuf>,

    /// Framework hint
    #[arg(long, env = "INPUT_FRAMEWORK")]
    framework: Option<String>,

    /// Force a target: production or staging
    #[arg(long, env = "INPUT_TARGET")]
    target: Option<DeploymentTarget>,

    /// Extra metadata, e.g. "-m team=web --meta owner=docs"
    #[arg(long, env = "INPUT_METADATA")]
    metadata: Option<String>,

    /// Alias domains, `[branch:]template` per entry; no branch means any
    #[arg(long, env = "INPUT_ALIAS_DOMAINS")]
    alias_domains: Option<String>,

    /// Comment even when the gate skips the deployment
    #[arg(long, env = "INPUT_COMMENT_ON_SKIP")]
    comment_on_skip: Option<bool>,

    /// Post a sticky comment at all
    #[arg(long, env = "INPUT_COMMENT")]
    comment_enabled: Option<bool>,
}

impl DeployArgs {
    fn apply(&self, config: &mut PreviewConfig) {
        let deploy = &mut config.deploy;
        if let Some(project_id) = &self.project_id {
            deploy.project_id = project_id.clone();
        }
        if self.org_id.is_some() {
            deploy.org_id = self.org_id.clone();
        }
        if self.name.is_some() {
            deploy.name = self.name.clone();
        }
        if let Some(dir) = &self.working_directory {
            deploy.working_directory = dir.clone();
        }
        if self.framework.is_some() {
            deploy.framework = self.framework.clone();
        }
        if self.target.is_some() {
            deploy.target = self.target;
        }
        if self.metadata.is_some() {
            deploy.extra_metadata = self.metadata.clone();
        }
        if let Some(raw) = &self.alias_domains {
            deploy.aliases = parse_aliases(raw);
        }
        if let Some(on_skip) = self.comment_on_skip {
            config.comment_on_skip = on_skip;
        }
        if let Some(enabled) = self.comment_enabled {
            config.comment_enabled = enabled;
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct CommentArgs {
    /// Marker key separating independent sticky comments
    #[arg(long, env = "INPUT_HEADER")]
    header: Option<String>,

    /// Append to the existing comment instead of replacing it
    #[arg(long, env = "INPUT_APPEND")]
    append: Option<bool>,

    /// Collapse open <details> blocks of the previous body
    #[arg(long, env = "INPUT_HIDE_DETAILS")]
    hide_details: Option<bool>,

    /// Skip the write when the body has not changed
    #[arg(long, env = "INPUT_SKIP_UNCHANGED")]
    skip_unchanged: Option<bool>,

    /// Do nothing for an empty body
    #[arg(long, env = "INPUT_IGNORE_EMPTY")]
    ignore_empty: Option<bool>,

    /// Only reuse comments by this login
    #[arg(long, env = "INPUT_AUTHOR")]
    author: Option<String>,

    /// upsert, only_create, only_update, recreate or hide_and_recreate
    #[arg(long, env = "INPUT_MODE")]
    mode: Option<CommentMode>,
}

impl CommentArgs {
    fn apply(&self, config: &mut PreviewConfig) {
        let comment = &mut config.comment;
        if let Some(header) = self.header.as_ref().filter(|h| !h.trim().is_empty()) {
            comment.header = header.clone();
        }
        if let Some(append) = self.append {
            comment.append = append;
        }
        if let Some(hide) = self.hide_details {
            comment.hide_details = hide;
        }
        if let Some(skip) = self.skip_unchanged {
            comment.skip_unchanged = skip;
        }
        if let Some(ignore) = self.ignore_empty {
            comment.ignore_empty = ignore;
        }
        if let Some(author) = self.author.as_ref().filter(|a| !a.trim().is_empty()) {
            comment.author = Some(author.clone());
        }
        if let Some(mode) = self.mode {
            comment.mode = mode;
        }
    }
}

/// Parse alias entries. `main:www.example.com` triggers on `main`; a bare
/// template triggers on every branch.
fn parse_aliases(raw: &str) -> Vec<AliasSpec> {
    split_list(raw)
        .into_iter()
        .map(|entry| match entry.split_once(':') {
            Some((branch, template)) if !branch.trim().is_empty() => AliasSpec {
                domain_template: template.trim().to_string(),
                trigger_branch: branch.trim().to_string(),
            },
            _ => AliasSpec {
                domain_template: entry.trim_start_matches(':').trim().to_string(),
                trigger_branch: previewbot_core::deploy::ANY_BRANCH.to_string(),
            },
        })
        .collect()
}

/// Defaults, then the optional TOML file.
fn load_config(path: Option<&Path>) -> Result<PreviewConfig> {
    match path {
        Some(path) => PreviewConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PreviewConfig::default()),
    }
}

/// Build the run context from the environment and the event payload file.
fn load_context() -> Result<RunContext> {
    let ctx = RunContext::from_env();
    match std::env::var_os("GITHUB_EVENT_PATH") {
        Some(path) => {
            let path = PathBuf::from(path);
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read event payload {}", path.display()))?;
            let payload: Value =
                serde_json::from_str(&raw).context("Event payload is not valid JSON")?;
            Ok(ctx.with_event_payload(&payload))
        }
        None => Ok(ctx),
    }
}

fn github_client(args: &GitHubArgs, repository: &str, token: &str) -> Result<Arc<GitHubClient>> {
    let mut config = GitHubConfig::new(repository, token);
    if let Some(api) = &args.github_api_url {
        config = config.with_api_base(api);
    }
    Ok(Arc::new(
        GitHubClient::new(config).context("Failed to build GitHub client")?,
    ))
}

/// Comment store for the primary token, with the fallback token behind it.
fn comment_store(
    args: &GitHubArgs,
    repository: &str,
    primary: Arc<GitHubClient>,
) -> Result<Arc<dyn CommentStore>> {
    let fallback: Option<Arc<dyn CommentStore>> = match args
        .fallback_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
    {
        Some(token) => Some(github_client(args, repository, token)?),
        None => None,
    };
    Ok(Arc::new(FallbackCommentStore::new(primary, fallback)))
}

fn require_token<'a>(token: &'a Option<String>, what: &str) -> Result<&'a str> {
    token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .with_context(|| format!("{} is required", what))
}

fn write_outputs(path: Option<&Path>, outputs: &RunOutputs) -> Result<()> {
    match path {
        Some(path) => outputs
            .write_to(path)
            .with_context(|| format!("Failed to write outputs to {}", path.display())),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    previewbot_core::init_tracing(format, level);

    let mut config = load_config(cli.config.as_deref())?;
    let ctx = load_context()?;

    match &cli.command {
        Commands::Run {
            policy,
            deploy,
            comment,
        } => {
            policy.apply(&mut config);
            deploy.apply(&mut config);
            comment.apply(&mut config);
            cmd_run(&cli, &ctx, &config, deploy).await
        }
        Commands::Gate { policy } => {
            policy.apply(&mut config);
            cmd_gate(&cli, &ctx, &config).await
        }
        Commands::Comment {
            body,
            body_file,
            comment,
        } => {
            comment.apply(&mut config);
            cmd_comment(&cli, &ctx, &config, body.as_deref(), body_file.as_deref()).await
        }
    }
}

async fn cmd_run(
    cli: &Cli,
    ctx: &RunContext,
    config: &PreviewConfig,
    deploy: &DeployArgs,
) -> Result<ExitCode> {
    let github_token = require_token(&cli.github.github_token, "A GitHub token")?;
    let vercel_token = require_token(&deploy.vercel_token, "A Vercel token")?;

    let github = github_client(&cli.github, &ctx.repository, github_token)?;
    let vercel = Arc::new(VercelClient::new(vercel_token).context("Failed to build Vercel client")?);
    let deps = PipelineDeps::new(
        comment_store(&cli.github, &ctx.repository, github.clone())?,
        github.clone(),
        github,
        vercel,
    );

    let result = PreviewPipeline::run(ctx, config, &deps)
        .await
        .context("Preview pipeline failed to run")?;

    write_outputs(cli.output_file.as_deref(), &RunOutputs::from_result(&result))?;

    match (&result.deployment, &result.error) {
        (Some(deployment), _) => {
            info!(url = %deployment.url, "Preview deployed");
            Ok(ExitCode::SUCCESS)
        }
        (None, Some(diagnosis)) => {
            warn!(error = %diagnosis, "Preview deployment failed");
            Ok(ExitCode::FAILURE)
        }
        (None, None) => {
            info!(reason = %result.gate.reason, "Preview skipped");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_gate(cli: &Cli, ctx: &RunContext, config: &PreviewConfig) -> Result<ExitCode> {
    let github_token = require_token(&cli.github.github_token, "A GitHub token")?;
    let github = github_client(&cli.github, &ctx.repository, github_token)?;

    let decision = evaluate_gate(ctx, &config.policy, github.as_ref())
        .await
        .context("Gate evaluation failed")?;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(ExitCode::from(gate_exit_code(decision.should_deploy())))
}

fn gate_exit_code(deploy: bool) -> u8 {
    if deploy {
        0
    } else {
        EXIT_SKIPPED
    }
}

async fn cmd_comment(
    cli: &Cli,
    ctx: &RunContext,
    config: &PreviewConfig,
    body: Option<&str>,
    body_file: Option<&Path>,
) -> Result<ExitCode> {
    let body = read_body(body, body_file)?;
    let github_token = require_token(&cli.github.github_token, "A GitHub token")?;
    let github = github_client(&cli.github, &ctx.repository, github_token)?;
    let store = comment_store(&cli.github, &ctx.repository, github)?;

    let manager = StickyCommentManager::new(store, config.comment.clone());
    let outcome = manager
        .upsert(&ctx.comment_target(), &body)
        .await
        .context("Failed to write sticky comment")?;

    write_outputs(cli.output_file.as_deref(), &RunOutputs::from_comment(&outcome))?;
    Ok(ExitCode::SUCCESS)
}

fn read_body(body: Option<&str>, body_file: Option<&Path>) -> Result<String> {
    match (body, body_file) {
        (Some(body), _) => Ok(body.to_string()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read comment body {}", path.display())),
        (None, None) => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use previewbot_core::deploy::ANY_BRANCH;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "previewbot",
            "--github-token",
            "ghp_x",
            "run",
            "--push-branches",
            "main,release",
            "--only-if-changed",
            "true",
            "--project-id",
            "prj_1",
            "--target",
            "staging",
            "--mode",
            "recreate",
        ])
        .unwrap();

        let Commands::Run {
            policy,
            deploy,
            comment,
        } = &cli.command
        else {
            panic!("expected run");
        };

        let mut config = PreviewConfig::default();
        policy.apply(&mut config);
        deploy.apply(&mut config);
        comment.apply(&mut config);

        assert_eq!(config.policy.push_branches.len(), 2);
        assert!(config.policy.only_if_changed);
        assert_eq!(config.deploy.project_id, "prj_1");
        assert_eq!(config.deploy.target, Some(DeploymentTarget::Staging));
        assert_eq!(config.comment.mode, CommentMode::Recreate);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("previewbot.toml");
        std::fs::write(
            &path,
            "[policy]\npush_branches = [\"main\"]\n\n[comment]\nheader = \"docs\"\n",
        )
        .unwrap();

        let mut config = load_config(Some(&path)).unwrap();
        PolicyArgs {
            push_branches: Some("dev".to_string()),
            ..PolicyArgs::default()
        }
        .apply(&mut config);
        CommentArgs::default().apply(&mut config);

        assert!(config.policy.push_branches.contains("dev"));
        assert!(!config.policy.push_branches.contains("main"));
        assert_eq!(config.comment.header, "docs");
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load config"));
    }

    #[test]
    fn test_parse_aliases() {
        let aliases = parse_aliases("main:www.example.com\n{{BRANCH}}.preview.example.com");
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].trigger_branch, "main");
        assert_eq!(aliases[0].domain_template, "www.example.com");
        assert_eq!(aliases[1].trigger_branch, ANY_BRANCH);
        assert_eq!(aliases[1].domain_template, "{{BRANCH}}.preview.example.com");
    }

    #[test]
    fn test_gate_exit_codes() {
        assert_eq!(gate_exit_code(true), 0);
        assert_eq!(gate_exit_code(false), 78);
    }

    #[test]
    fn test_read_body_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.md");
        std::fs::write(&path, "## hello").unwrap();
        assert_eq!(read_body(None, Some(&path)).unwrap(), "## hello");
        assert_eq!(read_body(Some("inline"), None).unwrap(), "inline");
        assert_eq!(read_body(None, None).unwrap(), "");
    }

    #[test]
    fn test_comment_body_conflicts_with_file() {
        let result = Cli::try_parse_from([
            "previewbot",
            "comment",
            "--body",
            "x",
            "--body-file",
            "y.md",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_token_is_error() {
        assert!(require_token(&None, "A GitHub token").is_err());
        assert!(require_token(&Some("  ".to_string()), "A GitHub token").is_err());
        assert_eq!(require_token(&Some("t".to_string()), "t").unwrap(), "t");
    }
}
