//! # sukyan
//!
//! The `scan run` entrypoint (spec §6). CLI framing beyond this one
//! entrypoint is out of scope (SPEC_FULL.md §1): `cleanup vacuum-db` and
//! `get <resource>` are recognized here only so the subcommand surface
//! matches spec §6, but both defer to the relational store this crate
//! doesn't implement and exit 0 having done nothing.
//!
//! Workspace history is read from a JSON file of `History` records
//! (`--history-file`) rather than a live database connection — the
//! relational store and crawl/proxy front-end are external collaborators
//! (spec §1); a real deployment wires `scan run` to its own store
//! instead of a file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sukyan_engine::config::{EngineConfig, ScanMode};
use sukyan_engine::http::{HttpExecutor, Transport};
use sukyan_engine::issues::{InMemoryIssueSink, IssueSink};
use sukyan_engine::oob::OOBCorrelator;
use sukyan_engine::orchestrator::Orchestrator;
use sukyan_types::{History, WorkspaceId};

#[derive(Parser)]
#[command(name = "sukyan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Active web-application security audit execution engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the audit orchestrator over a workspace's captured history.
    Scan {
        #[command(subcommand)]
        action: ScanAction,
    },
    /// Out of core: vacuums the relational store. Recognized for CLI
    /// surface parity only (spec §6); the store is an external
    /// collaborator this crate does not implement.
    Cleanup {
        #[command(subcommand)]
        action: CleanupAction,
    },
    /// Out of core: lists a persisted resource (issues, histories, …).
    /// Recognized for CLI surface parity only (spec §6).
    Get {
        resource: String,
    },
}

#[derive(Subcommand)]
enum ScanAction {
    Run(ScanRunArgs),
}

#[derive(Subcommand)]
enum CleanupAction {
    VacuumDb,
}

#[derive(Args)]
struct ScanRunArgs {
    /// Workspace to scan. Only history records tagged with this
    /// workspace id in `--history-file` are dispatched.
    #[arg(long)]
    workspace: uuid::Uuid,

    /// Scan mode: governs insertion-point and payload-variant breadth
    /// (spec §6).
    #[arg(long, value_enum, default_value_t = ScanMode::Smart)]
    mode: ScanMode,

    /// JSON file containing an array of captured `History` records
    /// (stand-in for the relational store's captured-history query;
    /// spec §1 treats the store as an external collaborator).
    #[arg(long)]
    history_file: PathBuf,

    /// History-level audit-module parallelism override (spec §5
    /// default: 10).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Enables audits held behind the experimental flag (React2Shell,
    /// CSWSH; spec §6).
    #[arg(long, default_value_t = false)]
    experimental_audits: bool,

    /// Run server-side audits. Defaults to on; `--server-side=false` to
    /// disable.
    #[arg(long, default_value_t = true)]
    server_side: bool,

    /// Run client-side audits (Alert, DOM-XSS, CSWSH). Defaults to on,
    /// but every client-side audit tolerates `ctx.browser == None` and
    /// reports nothing when no Browser Pool is wired in — this binary
    /// does not link a CDP driver (spec §1: the CDP driver is an
    /// external capability).
    #[arg(long, default_value_t = true)]
    client_side: bool,

    /// Restrict to a comma-separated list of insertion-point names.
    #[arg(long, value_delimiter = ',')]
    insertion_points: Option<Vec<String>>,

    /// Restrict to a comma-separated list of audit kinds (matched
    /// against `AuditKind::as_str()`).
    #[arg(long, value_delimiter = ',')]
    fingerprints: Option<Vec<String>>,

    /// Accept self-signed TLS certificates (scanner mode). Defaults on.
    #[arg(long, default_value_t = true)]
    tls_accept_invalid_certs: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sukyan_engine=info".into()))
        .init();

    let cli = Cli::parse();

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan { action: ScanAction::Run(args) } => scan_run(args).await,
        Commands::Cleanup { action: CleanupAction::VacuumDb } => {
            warn!("cleanup vacuum-db is out of core (spec §1: the relational store is an external collaborator); nothing to do");
            Ok(())
        }
        Commands::Get { resource } => {
            warn!(resource, "get is out of core (spec §1: the relational store is an external collaborator); nothing to do");
            Ok(())
        }
    }
}

async fn scan_run(args: ScanRunArgs) -> Result<()> {
    let workspace_id = WorkspaceId(args.workspace);

    let text = std::fs::read_to_string(&args.history_file)
        .with_context(|| format!("reading history file {}", args.history_file.display()))?;
    let histories: Vec<History> = serde_json::from_str(&text).with_context(|| "history file is not a JSON array of History records")?;

    let histories: Vec<History> = histories.into_iter().filter(|h| h.workspace_id == workspace_id).collect();
    if histories.is_empty() {
        warn!(%workspace_id, "no captured history found for this workspace; nothing to scan");
        return Ok(());
    }

    let mut config = EngineConfig::default();
    config.scan_mode = args.mode;
    config.experimental_audits = args.experimental_audits;
    config.server_side = args.server_side;
    config.client_side = args.client_side;
    config.insertion_point_filter = args.insertion_points;
    config.fingerprint_filter = args.fingerprints;
    config.tls_accept_invalid_certs = args.tls_accept_invalid_certs;
    if let Some(concurrency) = args.concurrency {
        config.concurrency.history_level = concurrency;
    }

    let http = HttpExecutor::new(Transport::Http1, config.tls_accept_invalid_certs).context("building HTTP executor")?;
    let sink = Arc::new(InMemoryIssueSink::new());
    let oob = OOBCorrelator::new();

    // No CDP driver is linked into this binary (spec §1: treated as an
    // external capability) — client-side audits run with `browser: None`
    // and report nothing rather than panicking.
    let orchestrator = Orchestrator::new(http, None, sink.clone(), oob, config);

    let scan_scope = CancellationToken::new();
    let ctrl_c_scope = scan_scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_scope.cancel();
        }
    });

    info!(workspace = %workspace_id, history_count = histories.len(), "starting scan");
    for history in &histories {
        orchestrator.scan_history(history, &scan_scope).await;
    }

    let issues = sink.all().await;
    info!(issue_count = issues.len(), "scan complete");
    for issue in &issues {
        println!(
            "[{:>8}] confidence={:<3} {} ({})",
            format!("{:?}", issue.severity),
            issue.confidence.value(),
            issue.title,
            issue.insertion_point_summary.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
