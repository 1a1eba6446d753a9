//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror website mirror.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use sumi_mirror::config::{read_config, validate, Config};
use sumi_mirror::output::{generate_markdown_summary, print_summary};
use sumi_mirror::{run_mirror, CrawlSummary, MirrorError, Shutdown};
use tracing_subscriber::EnvFilter;

/// Exit code for a crawl stopped by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Exit code for an unrecoverable startup failure
const EXIT_STARTUP: u8 = 1;

/// Exit code for invalid configuration or arguments
const EXIT_CONFIG: u8 = 2;

/// Sumi-Mirror: An offline website mirror
///
/// Sumi-Mirror crawls a site breadth-first from a seed URL, downloads the
/// assets its pages reference and rewrites links so the copy can be
/// browsed from disk.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version)]
#[command(about = "An offline website mirror", long_about = None)]
struct Cli {
    /// Seed URL to start mirroring from
    #[arg(short, long, value_name = "URL")]
    url: Option<String>,

    /// Directory the mirror is written to (default: derived from the host)
    #[arg(short, long, value_name = "DIR")]
    destination: Option<String>,

    /// Maximum number of pages to fetch
    #[arg(short = 'm', long, value_name = "N")]
    max_pages: Option<usize>,

    /// Number of concurrent asset download workers
    #[arg(short, long, visible_alias = "workers", value_name = "N")]
    threads: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Retries for transient failures
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write a markdown summary to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Validate the configuration and show what would be mirrored
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return ExitCode::SUCCESS;
    }

    let report = cli
        .report
        .clone()
        .or_else(|| config.output.report_path.as_ref().map(PathBuf::from));

    handle_mirror(config, report.as_deref()).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_mirror=info,warn"),
            1 => EnvFilter::new("sumi_mirror=debug,info"),
            2 => EnvFilter::new("sumi_mirror=trace,debug"),
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

/// Loads the optional config file, applies CLI overrides and validates
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            read_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(url) = &cli.url {
        config.seed = url.clone();
    }
    if let Some(destination) = &cli.destination {
        config.output.destination = Some(destination.clone());
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(threads) = cli.threads {
        config.crawler.workers = threads;
    }
    if let Some(timeout) = cli.timeout {
        config.fetch.timeout_secs = timeout;
    }
    if let Some(retries) = cli.retries {
        config.fetch.max_retries = retries;
    }

    validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Seed: {}", config.seed);
    println!(
        "Destination: {}",
        config.output.destination.as_deref().unwrap_or("(derived from host)")
    );

    println!("\nCrawler:");
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Workers: {}", config.crawler.workers);
    println!("  Shutdown grace: {}ms", config.crawler.shutdown_grace_ms);

    println!("\nFetch:");
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  Max retries: {}", config.fetch.max_retries);
    println!(
        "  Back-off: {}ms x{} (max {}ms, budget {}ms)",
        config.fetch.base_delay_ms,
        config.fetch.backoff_factor,
        config.fetch.max_delay_ms,
        config.fetch.attempt_budget_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\n✓ Configuration is valid");
}

/// Handles the main mirror operation
async fn handle_mirror(config: Config, report: Option<&Path>) -> ExitCode {
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown
                .on_interrupts(
                    || async { tokio::signal::ctrl_c().await.is_ok() },
                    || std::process::exit(EXIT_INTERRUPTED.into()),
                )
                .await;
        });
    }

    match run_mirror(config, shutdown).await {
        Ok(summary) => {
            print_summary(&summary);
            if let Some(path) = report {
                write_report(&summary, path);
            }
            if summary.interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!("Mirror failed: {}", e);
            match e {
                MirrorError::Config(_) | MirrorError::InvalidSeed(_) => ExitCode::from(EXIT_CONFIG),
                _ => ExitCode::from(EXIT_STARTUP),
            }
        }
    }
}

fn write_report(summary: &CrawlSummary, path: &Path) {
    match generate_markdown_summary(summary, path) {
        Ok(()) => tracing::info!("Summary written to: {}", path.display()),
        Err(e) => tracing::error!("{}", e),
    }
}
