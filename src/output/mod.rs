//! Output module for run summaries and reports
//!
//! This module handles:
//! - Writing the JSON run summary
//! - Generating the markdown run report
//! - Printing per-category statistics
//! - Exporting the run's rows as CSV

mod export;
mod markdown;
pub mod stats;
mod summary;

pub use export::{export_csv, ExportReport};
pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{load_latest_statistics, print_category_statistics, print_run_statistics};
pub use summary::{write_json_summary, FetchTotals, LoadReport, RunSummary};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
