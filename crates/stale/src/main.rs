//! CLI for the stale bot engine.
//!
//! Each subcommand is one invocation; scheduling and webhook delivery live
//! elsewhere. Run `stale --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use stale::{
    resolve_file, resolve_source, ActivityEvent, ApprovalReport, Approver, Automation, EffectiveConfig,
    Resolution, StaleConfig, SweepReport, Sweeper, UnmarkTrigger,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracker::{github::GITHUB_API_URL, GitHubTracker, RepoRef, TeamRef};

#[derive(Parser)]
#[command(name = "stale")]
#[command(about = "Mark, close and unmark stale issues; post second approvals")]
#[command(version)]
struct Cli {
    /// Repository in owner/repo format
    #[arg(short, long, env = "STALE_REPOSITORY", global = true)]
    repo: Option<String>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = GITHUB_API_URL, global = true)]
    api_url: String,

    /// Path to the repository's stale configuration (YAML)
    #[arg(short, long, env = "STALE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Login the automation acts as
    #[arg(long, env = "STALE_BOT_LOGIN", default_value = "mlpack-bot[bot]", global = true)]
    bot_login: String,

    /// Team whose approvals count (organisation is the repository owner)
    #[arg(long, env = "STALE_REVIEW_TEAM", default_value = "contributors", global = true)]
    team: String,

    /// Log what would be done without mutating anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Output format: json, text
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format: text, json
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark idle items stale and close aged stale items
    Sweep {
        /// Only sweep this type: issues, pulls
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<String>,
    },

    /// Post second approvals on pull requests awaiting review
    Approve,

    /// Sweep, then approve
    Run,

    /// Unmark the item referenced by a webhook payload
    Unmark {
        /// Path to the webhook payload (JSON)
        #[arg(short, long)]
        event: PathBuf,

        /// Webhook event name (X-GitHub-Event)
        #[arg(long)]
        event_name: Option<String>,
    },

    /// Print the resolved configuration
    Config,
}

/// Everything a subcommand needs to talk to one repository.
struct Session {
    github: GitHubTracker,
    repo: RepoRef,
    config: StaleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    let resolution = load_config(cli.config.as_deref(), cli.dry_run)?;

    match &cli.command {
        Commands::Sweep { kind } => {
            let ctx = connect(&cli, resolution.config)?;
            let reports = run_sweep(&ctx, kind.as_deref()).await?;
            print_sweep(&reports, cli.format)?;
        }
        Commands::Approve => {
            let ctx = connect(&cli, resolution.config)?;
            let report = run_approve(&ctx, &cli).await?;
            print_approval(&report, cli.format)?;
        }
        Commands::Run => {
            let ctx = connect(&cli, resolution.config)?;
            let reports = run_sweep(&ctx, None).await?;
            print_sweep(&reports, cli.format)?;
            let report = run_approve(&ctx, &cli).await?;
            print_approval(&report, cli.format)?;
        }
        Commands::Unmark { event, event_name } => {
            let ctx = connect(&cli, resolution.config)?;
            run_unmark(&ctx, &cli, event, event_name.as_deref()).await?;
        }
        Commands::Config => print_config(&resolution, cli.format)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("stale=debug,tracker=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stale=info,tracker=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(path: Option<&Path>, dry_run: bool) -> Result<Resolution> {
    let defaults = EffectiveConfig::default();
    let mut resolution = match path {
        Some(path) => resolve_file(&defaults, path).context("Failed to load configuration")?,
        None => {
            debug!("No config file given, using defaults");
            resolve_source(&defaults, "")
        }
    };
    if dry_run {
        resolution.config = resolution.config.dry_run();
    }
    Ok(resolution)
}

fn connect(cli: &Cli, config: StaleConfig) -> Result<Session> {
    let repo: RepoRef = cli
        .repo
        .as_deref()
        .context("No repository given (use --repo or STALE_REPOSITORY)")?
        .parse()?;
    let token = cli
        .token
        .as_deref()
        .context("No token given (use --token or GITHUB_TOKEN)")?;
    let github = GitHubTracker::with_api_url(token, &cli.api_url)
        .context("Failed to create GitHub client")?;

    Ok(Session {
        github,
        repo,
        config,
    })
}

async fn run_sweep(ctx: &Session, kind: Option<&str>) -> Result<Vec<SweepReport>> {
    let sweeper = Sweeper::new(&ctx.github, &ctx.repo, &ctx.config);
    let now = Utc::now();

    let reports = match kind {
        Some(kind) => vec![sweeper.mark_and_sweep_type(kind, now).await?],
        None => sweeper.sweep_all(now).await?,
    };
    Ok(reports)
}

async fn run_approve(ctx: &Session, cli: &Cli) -> Result<ApprovalReport> {
    let automation = Automation {
        login: cli.bot_login.clone(),
        team: TeamRef::new(ctx.repo.owner.clone(), cli.team.clone()),
    };
    let approver = Approver::new(&ctx.github, &ctx.repo, &ctx.config, &automation);
    Ok(approver.auto_approve(Utc::now()).await?)
}

async fn run_unmark(ctx: &Session, cli: &Cli, path: &Path, event_name: Option<&str>) -> Result<()> {
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event payload {}", path.display()))?;
    let event: ActivityEvent =
        serde_json::from_str(&payload).context("Failed to parse event payload")?;

    let trigger = UnmarkTrigger::new(&ctx.github, &ctx.repo, &ctx.config, &cli.bot_login);
    let outcome = trigger.handle(event_name, &event).await?;
    info!(outcome = ?outcome, "Unmark finished");

    match cli.format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text => println!("unmark: {outcome:?}"),
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_sweep(reports: &[SweepReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(reports)?,
        OutputFormat::Text => {
            for report in reports {
                if report.skipped {
                    println!("{}: skipped (only)", report.kind);
                    continue;
                }
                println!(
                    "{}: {} marked, {} closed, {} dry-run, {} over budget, {} ignored, {} failed{}",
                    report.kind,
                    report.marked,
                    report.closed,
                    report.dry_run,
                    report.over_budget,
                    report.ignored,
                    report.failed,
                    if report.closing_enabled { "" } else { " (closing disabled)" },
                );
            }
        }
    }
    Ok(())
}

fn print_approval(report: &ApprovalReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Text => println!(
            "approvals: {} candidates, {} approved, {} dry-run, {} no action, {} locked, {} vanished, {} failed",
            report.candidates,
            report.approved,
            report.dry_run,
            report.no_action,
            report.locked,
            report.vanished,
            report.failed,
        ),
    }
    Ok(())
}

fn print_config(resolution: &Resolution, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "config": resolution.config,
            "warnings": resolution.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text => {
            println!("{}", serde_yaml::to_string(&resolution.config)?);
            for warning in &resolution.warnings {
                println!("warning: {warning}");
            }
        }
    }
    Ok(())
}
