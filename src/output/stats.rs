//! Category statistics display
//!
//! Prints the per-category fetch results, either right after a run or for
//! the latest stored run (`--stats`).

use crate::output::{FetchTotals, OutputResult};
use crate::source::CategoryStats;
use crate::storage::{RunRecord, Storage};

/// Statistics of a stored run
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub run: RunRecord,
    pub categories: Vec<CategoryStats>,
}

/// Loads the latest run and its category statistics
///
/// # Returns
///
/// * `Ok(Some(RunStatistics))` - The latest run
/// * `Ok(None)` - No run recorded yet
/// * `Err(OutputError)` - Failed to query storage
pub fn load_latest_statistics(storage: &dyn Storage) -> OutputResult<Option<RunStatistics>> {
    let Some(run) = storage.get_latest_run()? else {
        return Ok(None);
    };
    let categories = storage.get_category_stats(run.id)?;
    Ok(Some(RunStatistics { run, categories }))
}

/// Formats one category as a report line
pub fn format_category_line(stats: &CategoryStats) -> String {
    let mut line = format!(
        "{:<14} {:>6}/{:<6} {:>6.1}%  pages {:>3}",
        stats.category.to_string(),
        stats.fetched_items,
        stats.expected_total,
        stats.completion_percent(),
        stats.pages_fetched
    );

    if stats.pages_failed > 0 {
        line.push_str(&format!("  failed {}", stats.pages_failed));
    }
    if stats.rate_limit_waits > 0 {
        line.push_str(&format!("  429 waits {}", stats.rate_limit_waits));
    }
    if stats.aborted {
        line.push_str("  ABORTED");
    }
    if stats.total_unresolved {
        line.push_str("  TOTAL UNRESOLVED");
    }
    line
}

/// Prints category statistics to stdout
///
/// Empty categories are listed only by count. Categories whose total could
/// not be resolved are listed in full.
pub fn print_category_statistics(stats: &[CategoryStats]) {
    println!("=== Category Statistics ===\n");

    let (active, empty): (Vec<_>, Vec<_>) = stats
        .iter()
        .partition(|s| s.expected_total > 0 || s.total_unresolved);

    for s in &active {
        println!("  {}", format_category_line(s));
    }
    if !empty.is_empty() {
        println!("  ({} empty categories)", empty.len());
    }
    println!();

    let totals = FetchTotals::from_stats(stats);
    println!(
        "Overall: {} / {} items ({:.1}%), {} pages, {} failed, {} rate-limit waits",
        totals.fetched_items,
        totals.expected_items,
        totals.completion_percent,
        totals.pages_fetched,
        totals.pages_failed,
        totals.rate_limit_waits
    );

    if totals.categories_incomplete > 0 {
        println!(
            "Incomplete categories: {} of {}",
            totals.categories_incomplete, totals.categories
        );
    }
    if totals.categories_unresolved > 0 {
        println!(
            "Unresolved totals: {} (not fetched)",
            totals.categories_unresolved
        );
    }
}

/// Prints a stored run with its categories
pub fn print_run_statistics(statistics: &RunStatistics) {
    let run = &statistics.run;
    println!("Run {} ({})", run.id, run.status.to_db_string());
    println!("  Started:  {}", run.started_at);
    if let Some(finished) = &run.finished_at {
        println!("  Finished: {}", finished);
    }
    println!("  Config:   {}", run.config_hash);
    println!();
    print_category_statistics(&statistics.categories);
}
