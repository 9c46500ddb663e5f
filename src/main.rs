//! Page-Harvest main entry point
//!
//! This is the command-line interface for the Page-Harvest crawl orchestrator.

use anyhow::{bail, Context};
use clap::Parser;
use page_harvest::checkpoint::IdentityKey;
use page_harvest::config::{load_config_with_hash, Config};
use page_harvest::control::ControlChannel;
use page_harvest::crawler::{Coordinator, FixtureNavigator, RunRequest};
use page_harvest::output::{compute_statistics, print_statistics, write_csv_export};
use page_harvest::storage::{open_store, RecordStore};
use page_harvest::RunState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Page-Harvest: a checkpoint-resumable crawl orchestrator
///
/// Page-Harvest walks a paginated source page by page, saves every record it
/// collects after each page, and picks up where it left off after an
/// interruption. While a crawl runs, type `pause`, `resume` or `stop` on
/// stdin; Ctrl-C also stops the crawl after saving.
#[derive(Parser, Debug)]
#[command(name = "page-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A checkpoint-resumable crawl orchestrator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show record statistics and the resume point, then exit
    #[arg(long, conflicts_with = "export")]
    status: bool,

    /// Rewrite the CSV export from the record store, then exit
    #[arg(long, conflicts_with = "status")]
    export: bool,

    /// JSON file of pages to replay through the crawl loop
    #[arg(long, value_name = "FILE")]
    fixture: Option<PathBuf>,

    /// First page to collect (defaults to the resume point)
    #[arg(long)]
    start: Option<u32>,

    /// Last page to collect (defaults to the discovered page count)
    #[arg(long)]
    end: Option<u32>,

    /// Collect at most this many items per page
    #[arg(long)]
    item_limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.status {
        handle_status(&config)
    } else if cli.export {
        handle_export(&config)
    } else {
        handle_crawl(&config, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("page_harvest=info,warn"),
            1 => EnvFilter::new("page_harvest=debug,info"),
            2 => EnvFilter::new("page_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --status mode: statistics and checkpoint decision for the store
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config);
    println!("Database: {}\n", store.path().display());

    if let Some(info) = store.snapshot_info()? {
        println!(
            "Last snapshot: {} ({} records)\n",
            info.written_at.to_rfc3339(),
            info.record_count
        );
    }

    let records = store.load()?;
    let key = IdentityKey::new(config.job.identity_fields.iter().cloned());
    let stats = compute_statistics(&records, &key, config.job.expected_items_per_page);
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: rebuilds the CSV export from the store
fn handle_export(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config);
    let export_path = config.output.export_path();

    println!("=== Exporting Records ===\n");
    println!("Database: {}", store.path().display());
    println!("Output: {}", export_path.display());
    println!();

    let records = store.load()?;
    write_csv_export(&export_path, &records)
        .with_context(|| format!("Failed to write {}", export_path.display()))?;

    println!("✓ Exported {} records to: {}", records.len(), export_path.display());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let Some(fixture) = &cli.fixture else {
        bail!("No navigator configured: pass --fixture <FILE> to replay pages from JSON");
    };

    let navigator = FixtureNavigator::load(fixture)?;
    tracing::info!(
        "Replaying {} pages from {}",
        navigator.page_count(),
        fixture.display()
    );

    let request = RunRequest {
        start_page: cli.start,
        end_page: cli.end,
        item_limit_per_page: cli.item_limit,
    };

    let coordinator = Coordinator::from_config(config, navigator, open_store(config));
    let control = Arc::clone(coordinator.control());

    let quiet = cli.quiet;
    control.subscribe_progress(move |progress| {
        if !quiet {
            println!(
                "[{:5.1}%] page {}/{}, {} records ({})",
                progress.percent_complete,
                progress.current_page,
                progress.total_pages,
                progress.record_count,
                progress.status_label
            );
        }
    });

    spawn_stdin_commands(Arc::clone(&control));
    spawn_interrupt_handler(Arc::clone(&control));

    let handle = coordinator.spawn(request);
    match handle.wait().await {
        Ok(summary) => {
            tracing::info!(
                "Run {}: pages {}-{}, {} attempted, {} skipped, {} item failures, {} records",
                summary.final_state,
                summary.start_page,
                summary.end_page,
                summary.pages_attempted,
                summary.pages_skipped,
                summary.items_failed,
                summary.record_count
            );
            if summary.unflushed {
                bail!("Records could not be saved; rerun once the store is writable");
            }
            if summary.final_state == RunState::Stopped {
                tracing::info!("Run again with the same configuration to resume");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Reads `pause` / `resume` / `stop` commands from stdin
fn spawn_stdin_commands(control: Arc<ControlChannel>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match line.trim() {
                    "pause" | "p" => control.request_pause(),
                    "resume" | "r" => control.request_resume(),
                    "stop" | "s" => control.request_stop(),
                    "" => {}
                    other => tracing::warn!("Unknown command '{}', expected pause, resume or stop", other),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Stopped reading commands from stdin: {}", e);
                    break;
                }
            }
        }
    });
}

/// Turns Ctrl-C into a stop request
fn spawn_interrupt_handler(control: Arc<ControlChannel>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            control.request_stop();
        }
    });
}
