//! Stargaze main entry point
//!
//! This is the command-line interface for the Stargaze GitHub star crawler.

use anyhow::Context;
use clap::Parser;
use stargaze::config::{load_config_with_hash, resolve_token, Config};
use stargaze::crawler::run_crawl;
use stargaze::output::{export_csv, load_statistics, print_statistics};
use stargaze::storage::open_storage;
use stargaze::StargazeError;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Stargaze: a rate-limited GitHub star crawler
///
/// Stargaze pages through GitHub's repository search, stays inside the
/// GraphQL rate limit, and upserts owner, name and star count of each
/// repository into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "stargaze")]
#[command(version)]
#[command(about = "A rate-limited GitHub star crawler", long_about = None)]
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

    /// Number of repositories to crawl, overriding the configuration
    #[arg(long, value_name = "COUNT")]
    target: Option<u64>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Export stored repositories as CSV and exit
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        conflicts_with_all = ["dry_run", "stats"]
    )]
    export: Option<Option<PathBuf>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, cli.target)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(path) = cli.export {
        let path = path.unwrap_or_else(|| PathBuf::from(&config.output.export_path));
        handle_export(&config, &path)
    } else {
        handle_crawl(&config, &config_hash, cli.target).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("stargaze=info,warn"),
            1 => EnvFilter::new("stargaze=debug,info"),
            2 => EnvFilter::new("stargaze=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, target: Option<u64>) -> anyhow::Result<()> {
    println!("=== Stargaze Dry Run ===\n");

    println!("GitHub:");
    println!("  Endpoint: {}", config.github.endpoint);
    println!("  Search query: {}", config.github.search_query);
    println!("  Page size: {}", config.github.page_size);
    println!("  Request timeout: {}s", config.github.request_timeout_secs);
    let token_status = match resolve_token(&config.github) {
        Ok(_) => "set",
        Err(_) => "MISSING",
    };
    println!("  Token ({}): {}", config.github.token_env, token_status);

    println!("\nCrawler:");
    println!(
        "  Target count: {}",
        target.unwrap_or(config.crawler.target_count)
    );
    println!("  Batch size: {}", config.crawler.batch_size);

    println!("\nRate Limit:");
    println!("  Low watermark: {}", config.rate_limit.low_watermark);
    println!("  Safety margin: {}s", config.rate_limit.safety_margin_secs);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Back-off: {}s doubling up to {}s{}",
        config.retry.base_delay_secs,
        config.retry.max_delay_secs,
        if config.retry.jitter { " with jitter" } else { "" }
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Export: {}", config.output.export_path);

    if target == Some(0) {
        anyhow::bail!("Target count must be greater than zero");
    }
    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats)?;

    Ok(())
}

/// Handles the --export mode: writes stored repositories to CSV
fn handle_export(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("=== Exporting Repositories ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", path.display());
    println!();

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let rows = export_csv(&storage, path)
        .with_context(|| format!("Failed to export to {}", path.display()))?;

    println!("✓ Exported {} repositories to: {}", rows, path.display());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    target: Option<u64>,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Stop cooperatively on Ctrl-C
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            signal_token.cancel();
        }
    });

    match run_crawl(config, config_hash, target, cancel).await {
        Ok(metrics) => {
            tracing::info!("Crawl completed successfully");
            println!("Repositories saved:   {}", metrics.records_crawled);
            println!("Duration:             {:.2}s", metrics.duration_seconds);
            println!(
                "Throughput:           {:.2} repositories/sec",
                metrics.throughput()
            );
            println!("Pages fetched:        {}", metrics.pages_fetched);
            println!("Rate-limit pauses:    {}", metrics.rate_limit_pauses);
            println!("Retries:              {}", metrics.retries);
            println!("Failed batches:       {}", metrics.errors_encountered);
            Ok(())
        }
        Err(e @ StargazeError::Cancelled { .. }) => {
            tracing::warn!("{}", e);
            Err(e.into())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
