//! bangumi-etl main entry point
//!
//! This is the command-line interface for the Bangumi collection ETL.

use anyhow::Context;
use bangumi_etl::config::{load_config_with_hash, Config};
use bangumi_etl::output::{
    generate_markdown_report, load_latest_statistics, print_category_statistics,
    print_run_statistics, write_json_summary, RunSummary,
};
use bangumi_etl::pipeline::{run_pipeline, RunOptions};
use bangumi_etl::storage::{open_storage, TableNames};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// bangumi-etl: Bangumi collection ETL
///
/// Pulls a user's Bangumi collection category by category, loads it into
/// SQLite, converges an incremental table against the fresh snapshot, and
/// publishes the rows into a Notion database.
#[derive(Parser, Debug)]
#[command(name = "bangumi-etl")]
#[command(version = "1.0.0")]
#[command(about = "Bangumi collection ETL", long_about = None)]
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

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics of the latest run and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Load and sync only, skip the Notion publish
    #[arg(long)]
    no_publish: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
    } else {
        handle_run(config, config_hash, !cli.no_publish).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bangumi_etl=info,warn"),
            1 => EnvFilter::new("bangumi_etl=debug,info"),
            2 => EnvFilter::new("bangumi_etl=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config) {
    println!("=== bangumi-etl Dry Run ===\n");

    println!("Source:");
    println!("  API: {}", config.source.base_url);
    println!("  User: {}", config.source.username);
    println!("  Page size: {}", config.source.page_size);
    println!(
        "  Access token: {}",
        if config.source.resolve_access_token().is_some() {
            "set"
        } else {
            "none (public collections only)"
        }
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Base delay: {}ms", config.retry.base_delay_ms);
    println!(
        "  Rate-limit cooldown: {}ms (at most {} per page)",
        config.retry.rate_limit_cooldown_ms, config.retry.max_rate_limit_waits
    );
    println!(
        "  Abort after {} consecutive failed pages",
        config.retry.max_consecutive_failures
    );

    let tables = TableNames::from_config(&config.storage);
    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!(
        "  Tables: {}, {}, {}",
        tables.raw, tables.fact, tables.incremental
    );

    println!("\nOutput:");
    println!("  Summary: {}", config.output.summary_path);
    if let Some(report) = &config.output.report_path {
        println!("  Report: {}", report);
    }
    if let Some(dir) = &config.output.export_dir {
        println!("  CSV export: {}", dir);
    }

    match &config.notion {
        Some(notion) => {
            println!("\nNotion:");
            match &notion.database_id {
                Some(id) => println!("  Database: {}", id),
                None => println!("  Database: create '{}'", notion.database_title),
            }
            println!("  Skip existing: {}", notion.skip_existing);
        }
        None => println!("\nNotion: not configured"),
    }

    let categories = config.categories();
    println!("\nCategories ({}):", categories.len());
    for category in &categories {
        println!("  - {}", category);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows the latest run from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))?;

    match load_latest_statistics(&storage)? {
        Some(statistics) => print_run_statistics(&statistics),
        None => println!("No runs recorded yet"),
    }

    Ok(())
}

/// Handles the main pipeline run
async fn handle_run(config: Config, config_hash: String, publish: bool) -> anyhow::Result<()> {
    let summary_path = PathBuf::from(&config.output.summary_path);
    let report_path = config.output.report_path.as_ref().map(PathBuf::from);

    tracing::info!(
        "Fetching {} categories for {}",
        config.categories().len(),
        config.source.username
    );
    if !publish {
        tracing::info!("Publishing disabled for this run");
    }

    let summary = run_pipeline(config, config_hash, RunOptions { publish })
        .await
        .context("Pipeline run failed")?;

    write_outputs(&summary, &summary_path, report_path.as_deref())?;
    print_category_statistics(&summary.categories);

    if let Some(export) = &summary.export {
        println!("\nExported {} rows as CSV to {}", export.rows, export.directory);
    }

    if let Some(publish) = &summary.publish {
        println!(
            "\nPublished {} rows to {} ({} failed)",
            publish.success_count, publish.database_url, publish.error_count
        );
    }

    Ok(())
}

fn write_outputs(
    summary: &RunSummary,
    summary_path: &Path,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    write_json_summary(summary, summary_path)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    tracing::info!("Summary written to {}", summary_path.display());

    if let Some(path) = report_path {
        generate_markdown_report(summary, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    Ok(())
}
