//! Pipeline module wiring the ETL stages together
//!
//! This module contains the run orchestration, including:
//! - Resolving category totals and paging through each category
//! - Projecting and loading the snapshot
//! - Converging the incremental table
//! - Publishing fact rows downstream
//! - Run bookkeeping and the final summary

mod coordinator;

pub use coordinator::{Pipeline, RunOptions};

use crate::config::Config;
use crate::output::RunSummary;
use crate::EtlError;

/// Runs a complete pipeline against the configured API and database
///
/// This is the main entry point of a run. It will:
/// 1. Open the SQLite database and record a new run
/// 2. Build the pooled HTTP transport
/// 3. Resolve totals and fetch every non-empty category
/// 4. Load the raw and fact tables and sync the incremental table
/// 5. Publish the fact rows, unless disabled
///
/// # Arguments
///
/// * `config` - The pipeline configuration
/// * `config_hash` - SHA-256 of the config file, recorded on the run
/// * `options` - Per-run switches
///
/// # Returns
///
/// * `Ok(RunSummary)` - Run finished, possibly with incomplete categories
/// * `Err(EtlError)` - Setup failed and the run was aborted
pub async fn run_pipeline(
    config: Config,
    config_hash: String,
    options: RunOptions,
) -> Result<RunSummary, EtlError> {
    let mut pipeline = Pipeline::from_config(config, config_hash)?;
    pipeline.run(options).await
}
