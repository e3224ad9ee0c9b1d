//! Run summary written at the end of every run

use crate::model::DataQuality;
use crate::output::{ExportReport, OutputResult};
use crate::publish::PublishReport;
use crate::source::CategoryStats;
use crate::sync::SyncReport;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Rows written by the snapshot loader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub raw_table: String,
    pub fact_table: String,
    pub rows_loaded: usize,
    pub duplicates_collapsed: u64,
    pub keyless_rows: u64,
    pub data_quality: DataQuality,
}

/// Totals across all categories
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchTotals {
    pub categories: usize,
    pub categories_incomplete: usize,
    /// Categories whose total check failed
    pub categories_unresolved: usize,
    pub expected_items: u64,
    pub fetched_items: u64,
    pub pages_fetched: u64,
    pub pages_failed: u64,
    pub rate_limit_waits: u64,
    pub completion_percent: f64,
}

impl FetchTotals {
    pub fn from_stats(stats: &[CategoryStats]) -> Self {
        let mut totals = Self {
            categories: stats.len(),
            ..Self::default()
        };

        for s in stats {
            totals.expected_items += s.expected_total;
            totals.fetched_items += s.fetched_items;
            totals.pages_fetched += u64::from(s.pages_fetched);
            totals.pages_failed += u64::from(s.pages_failed);
            totals.rate_limit_waits += u64::from(s.rate_limit_waits);
            if !s.is_complete() {
                totals.categories_incomplete += 1;
            }
            if s.total_unresolved {
                totals.categories_unresolved += 1;
            }
        }

        totals.completion_percent = if totals.expected_items > 0 {
            totals.fetched_items as f64 / totals.expected_items as f64 * 100.0
        } else {
            0.0
        };
        totals
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub username: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_seconds: f64,
    pub config_hash: String,
    pub totals: FetchTotals,
    pub categories: Vec<CategoryStats>,
    pub load: Option<LoadReport>,
    pub sync: Option<SyncReport>,
    pub export: Option<ExportReport>,
    pub publish: Option<PublishReport>,
}

impl RunSummary {
    /// Categories that skipped pages, aborted or have no known total
    pub fn incomplete_categories(&self) -> impl Iterator<Item = &CategoryStats> {
        self.categories.iter().filter(|s| !s.is_complete())
    }
}

/// Writes the summary as pretty-printed JSON
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Destination file, replaced if present
pub fn write_json_summary(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let json = serde_json::to_string_pretty(summary)?;

    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;

    Ok(())
}
