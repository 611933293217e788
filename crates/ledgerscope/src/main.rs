//! LedgerScope CLI - backfill monitoring for distributed-ledger ingestion.
//!
//! The main entry point for the `lscope` binary. All business logic lives
//! in `ledgerscope-core`; this crate only parses arguments, renders
//! snapshots, and handles destructive-action confirmation.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use ledgerscope_core::config::MonitorConfig;
use ledgerscope_core::eta::format_coarse;
use ledgerscope_core::logging::init_logging;
use ledgerscope_core::monitor::{Monitor, MonitorSnapshot};
use ledgerscope_core::reconcile::Reconciliation;
use ledgerscope_core::source::HttpIngestSource;

/// How long `status` waits for the first populated snapshot.
const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "lscope", version, about = "Backfill monitoring dashboard")]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the ingest status endpoint from the config.
    #[arg(long, global = true, env = "LSCOPE_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show a one-shot snapshot of backfill state.
    Status {
        /// Emit the full snapshot as JSON instead of the rendered view.
        #[arg(long)]
        json: bool,
    },
    /// Continuously render snapshots as they update.
    Watch,
    /// Destructive: purge all backfill cursor state.
    PurgeCursors {
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Corrective: purge the live cursor so the live process resumes from
    /// the latest backfill position.
    PurgeLive {
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Run both purges as a batch, reporting per-step outcomes.
    PurgeEverything {
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

fn load_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.log)?;
    debug!(endpoint = %config.endpoint, "starting lscope");

    let source = Arc::new(HttpIngestSource::new(config.endpoint.clone()));
    let monitor = Monitor::spawn(source, &config).await?;

    let result = match cli.command {
        Commands::Status { json } => status(&monitor, json).await,
        Commands::Watch => watch(&monitor).await,
        Commands::PurgeCursors { yes } => purge_cursors(&monitor, yes).await,
        Commands::PurgeLive { yes } => purge_live(&monitor, yes).await,
        Commands::PurgeEverything { yes } => purge_everything(&monitor, yes).await,
    };

    monitor.shutdown();
    result
}

/// Wait for the first snapshot that has data (or a feed failure to report).
async fn first_snapshot(monitor: &Monitor) -> Result<MonitorSnapshot> {
    let mut rx = monitor.subscribe();
    tokio::time::timeout(FIRST_SNAPSHOT_TIMEOUT, rx.changed())
        .await
        .context("timed out waiting for the first snapshot")?
        .context("monitor stopped before producing a snapshot")?;
    let snapshot = rx.borrow().clone();
    Ok(snapshot)
}

async fn status(monitor: &Monitor, json: bool) -> Result<()> {
    let snapshot = first_snapshot(monitor).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render(&snapshot));
    }
    Ok(())
}

async fn watch(monitor: &Monitor) -> Result<()> {
    let mut rx = monitor.subscribe();
    loop {
        rx.changed().await.context("monitor stopped")?;
        let snapshot = rx.borrow().clone();
        println!("\x1b[2J\x1b[H"); // clear screen, home cursor
        print!("{}", render(&snapshot));
    }
}

fn render(snapshot: &MonitorSnapshot) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();

    match snapshot.overall_progress {
        Some(pct) => {
            let _ = writeln!(out, "Overall progress: {pct:.1}%");
        }
        None => {
            let _ = writeln!(out, "Overall progress: unknown");
        }
    }
    if snapshot.activity.active {
        let signals: Vec<String> = snapshot
            .activity
            .signals
            .iter()
            .map(ToString::to_string)
            .collect();
        let _ = writeln!(out, "Writes in flight ({})", signals.join(", "));
    } else {
        let _ = writeln!(out, "No write activity");
    }
    if let Some(epoch) = &snapshot.current_migration {
        let _ = writeln!(out, "Current migration: {epoch}");
    }

    let _ = writeln!(out);
    for group in &snapshot.groups {
        let progress = group
            .progress
            .map_or_else(|| "-".to_string(), |p| format!("{p:.1}%"));
        let _ = writeln!(
            out,
            "  migration {:<12} {:<10} {:>7}  ({} cursors)",
            group.epoch.to_string(),
            group.status.to_string(),
            progress,
            group.cursors.len()
        );
    }

    if !snapshot.etas.is_empty() {
        let _ = writeln!(out);
        for eta in &snapshot.etas {
            let rendered = eta
                .estimate
                .eta
                .remaining()
                .map_or_else(|| eta.estimate.eta.to_string(), format_coarse);
            let _ = writeln!(
                out,
                "  {} ~{} remaining ({} updates/s)",
                eta.cursor_id, rendered, eta.estimate.throughput_per_sec
            );
        }
    }

    if let Some(live) = &snapshot.live {
        let _ = writeln!(out);
        if live.all_backfill_complete {
            let _ = writeln!(out, "All backfill cursors complete");
        }
        if let Some(record_time) = live.current_record_time {
            let _ = writeln!(out, "Live record time: {record_time}");
        }
        if let Some(file_write) = live.latest_file_write {
            let _ = writeln!(out, "Latest file write: {file_write}");
        }
        if let Some(suggestion) = &live.suggestion {
            let _ = writeln!(out, "Suggestion: {suggestion}");
        }
    }

    match snapshot.reconciliation {
        Reconciliation::LiveBehind { resume_migration } => {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "! Live ingestion is behind backfill; purge the live cursor to \
                 resume from migration {resume_migration} (lscope purge-live)"
            );
        }
        Reconciliation::InSync | Reconciliation::NoData => {}
    }

    let health = &snapshot.health;
    let stale: Vec<&str> = [
        ("cursors", health.cursor_list.is_stale()),
        ("stats", health.aggregate_stats.is_stale()),
        ("write-activity", health.write_activity.is_stale()),
        ("live-status", health.live_status.is_stale()),
    ]
    .into_iter()
    .filter_map(|(name, is_stale)| is_stale.then_some(name))
    .collect();
    if !stale.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "! Stale feeds: {}", stale.join(", "));
    }

    out
}

/// Prompt for confirmation of a destructive action.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

async fn purge_cursors(monitor: &Monitor, yes: bool) -> Result<()> {
    if !yes && !confirm("Delete ALL backfill cursor state?")? {
        bail!("aborted");
    }
    let summary = monitor.purge_all().await?;
    println!("Deleted {} cursors", summary.deleted_cursors);
    if let Some(updates) = summary.deleted_updates {
        println!("Deleted {updates} update rows");
    }
    if let Some(events) = summary.deleted_events {
        println!("Deleted {events} event rows");
    }
    Ok(())
}

async fn purge_live(monitor: &Monitor, yes: bool) -> Result<()> {
    if !yes && !confirm("Delete the live cursor?")? {
        bail!("aborted");
    }
    let outcome = monitor.purge_live().await?;
    if outcome.success {
        println!("{}", outcome.message);
        Ok(())
    } else {
        bail!("live cursor purge refused: {}", outcome.message)
    }
}

async fn purge_everything(monitor: &Monitor, yes: bool) -> Result<()> {
    if !yes && !confirm("Delete ALL cursor state, including the live cursor?")? {
        bail!("aborted");
    }
    let report = monitor.purge_everything().await;
    for step in &report.steps {
        let mark = if step.success { "ok" } else { "FAILED" };
        println!("{:<16} {:<6} {}", step.step, mark, step.detail);
    }
    if report.failed() > 0 {
        bail!("{} of {} purge steps failed", report.failed(), report.steps.len());
    }
    Ok(())
}
