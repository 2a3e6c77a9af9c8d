//! Harrow main entry point
//!
//! This is the command-line interface for the Harrow harvester.

use anyhow::{Context, Result};
use clap::Parser;
use harrow::config::{load_config_with_hash, Config};
use harrow::crawler::harvest;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Harrow: a resilient harvester for paginated result listings
///
/// Harrow pages through search engine and job board results while pacing
/// requests, rotating client identities, backing off from blocks, and
/// pausing for an operator when a CAPTCHA appears.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version)]
#[command(about = "A resilient harvester for defended result listings", long_about = None)]
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

    /// Clear stored checkpoints before harvesting
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export"])]
    fresh: bool,

    /// Validate config and show the queries that would run
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Export stored results as JSON and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else {
        handle_harvest(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harrow=info,warn"),
            1 => EnvFilter::new("harrow=debug,info"),
            2 => EnvFilter::new("harrow=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration and queries
fn handle_dry_run(config: &Config) {
    println!("=== Harrow Dry Run ===\n");

    let engine = &config.engine;
    println!("Engine:");
    println!("  Rate limit: {} requests/min per site", engine.rate_limit_rpm);
    println!(
        "  Inter-page delay: {}s - {}s ({})",
        engine.min_delay,
        engine.max_delay,
        if engine.enable_delay_jitter {
            "on"
        } else {
            "off"
        }
    );
    println!("  Max retries: {}", engine.max_retries);
    println!("  Timeout: {}s", engine.timeout);
    println!("  CAPTCHA poll interval: {}s", engine.captcha_poll_interval);
    println!("  Transport preference: {:?}", engine.transport_preference);
    println!("  UA rotation: {}", engine.enable_ua_rotation);
    println!("  Concurrent queries: {}", engine.max_concurrent_queries);

    println!("\nBrowser:");
    if config.browser.enabled {
        println!("  DevTools endpoint: {}", config.browser.debugging_url);
        println!("  Settle: {:?}", config.browser.settle);
    } else {
        println!("  Disabled");
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Export: {}", config.output.export_path);

    let queries = config.all_queries();
    println!("\nQueries ({}):", queries.len());
    for query in &queries {
        println!("  - {}", query.id);
        println!("    {}", query.url);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    use harrow::output::{load_statistics, print_statistics};
    use harrow::storage::open_store;

    println!("Database: {}\n", config.output.database_path);

    let store = open_store(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes stored results as JSON
fn handle_export(config: &Config) -> Result<()> {
    use harrow::output::export_results;
    use harrow::storage::open_store;

    let store = open_store(Path::new(&config.output.database_path))?;
    let written = export_results(&store, Path::new(&config.output.export_path))
        .with_context(|| format!("Failed to write {}", config.output.export_path))?;

    println!(
        "✓ Exported {} results to: {}",
        written, config.output.export_path
    );

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (clearing stored checkpoints)");
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after saving progress");
            on_interrupt.cancel();
        }
    });

    let summary = harvest(config, config_hash, fresh, cancel)
        .await
        .context("Harvest failed")?;

    for (query_id, error) in &summary.failed {
        tracing::error!("Query {} failed: {}", query_id, error);
    }

    tracing::info!(
        "Harvest finished: {} results from {} queries",
        summary.total_results(),
        summary.completed.len()
    );

    Ok(())
}
