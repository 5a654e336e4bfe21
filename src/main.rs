//! Shelfsweep main entry point
//!
//! Command-line interface for the shelfsweep catalogue crawler.

use clap::Parser;
use shelfsweep::config::load_config_with_hash;
use shelfsweep::crawler::{run_crawl, RunMode, StartMode};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shelfsweep: an incremental bookstore-catalogue crawler
///
/// Harvests book listings from a paginated catalogue into SQLite. A fresh
/// crawl rebuilds the document set; an incremental crawl diffs each book
/// against the previous run and records every change in a changelog.
#[derive(Parser, Debug)]
#[command(name = "shelfsweep")]
#[command(version = "1.0.0")]
#[command(about = "An incremental bookstore-catalogue crawler", long_about = None)]
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

    /// Start over: clear stored books, changelog, and checkpoint
    #[arg(long, conflicts_with_all = ["resume", "incremental"])]
    fresh: bool,

    /// Resume the interrupted run recorded in the checkpoint
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Diff against stored books and record changes instead of rebuilding
    #[arg(long)]
    incremental: bool,

    /// Crawl only the seed page (overrides the config setting)
    #[arg(long)]
    single_page: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["fresh", "resume", "incremental"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.single_page {
        config.crawler.single_page = true;
    }

    if cli.stats {
        return handle_stats(&config);
    }

    let mode = if cli.incremental {
        RunMode::Incremental
    } else {
        RunMode::Fresh
    };
    let start = if cli.fresh {
        StartMode::Fresh
    } else if cli.resume {
        StartMode::Resume
    } else {
        StartMode::Auto
    };

    handle_crawl(config, mode, start).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelfsweep=info,warn"),
            1 => EnvFilter::new("shelfsweep=debug,info"),
            2 => EnvFilter::new("shelfsweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &shelfsweep::Config) -> anyhow::Result<()> {
    use shelfsweep::output::{load_statistics, print_statistics};
    use shelfsweep::storage::open_storage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: shelfsweep::Config,
    mode: RunMode,
    start: StartMode,
) -> anyhow::Result<()> {
    match mode {
        RunMode::Fresh => tracing::info!("Starting crawl (full rebuild)"),
        RunMode::Incremental => tracing::info!("Starting crawl (incremental change detection)"),
    }

    // Ctrl-C is handled inside the run: workers stop cooperatively and the
    // checkpoint captures whatever was still outstanding.
    let report = run_crawl(config, mode, start).await?;

    tracing::info!(
        "Crawl finished: {} processed, {} unchanged, {} failed, {} enqueued, \
         {} outstanding, in {:?}",
        report.processed,
        report.unchanged,
        report.failed,
        report.sessions_enqueued,
        report.outstanding,
        report.duration
    );

    Ok(())
}
