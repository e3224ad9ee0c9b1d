//! Markdown run report
//!
//! Human-readable companion of the JSON summary: run metadata, the category
//! table, and the load, sync and publish outcomes.

use crate::output::{OutputResult, RunSummary};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report of a run
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_report(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_report(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Bangumi Collection Run: {}\n\n", summary.username));

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.duration_seconds
    ));
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    let totals = &summary.totals;
    md.push_str("## Fetch Totals\n\n");
    md.push_str(&format!(
        "- **Items**: {} / {} ({:.1}%)\n",
        totals.fetched_items, totals.expected_items, totals.completion_percent
    ));
    md.push_str(&format!("- **Pages Fetched**: {}\n", totals.pages_fetched));
    md.push_str(&format!("- **Pages Failed**: {}\n", totals.pages_failed));
    md.push_str(&format!(
        "- **Rate-Limit Waits**: {}\n",
        totals.rate_limit_waits
    ));
    md.push_str(&format!(
        "- **Incomplete Categories**: {} of {}\n",
        totals.categories_incomplete, totals.categories
    ));
    if totals.categories_unresolved > 0 {
        md.push_str(&format!(
            "- **Unresolved Totals**: {} (not fetched)\n",
            totals.categories_unresolved
        ));
    }
    md.push('\n');

    let active: Vec<_> = summary
        .categories
        .iter()
        .filter(|s| s.expected_total > 0 || s.total_unresolved)
        .collect();
    if !active.is_empty() {
        md.push_str("## Categories\n\n");
        md.push_str("| Category | Fetched | Expected | Completion | Pages | Failed | Aborted |\n");
        md.push_str("|----------|---------|----------|------------|-------|--------|---------|\n");
        for s in active {
            let expected = if s.total_unresolved {
                "unknown".to_string()
            } else {
                s.expected_total.to_string()
            };
            md.push_str(&format!(
                "| {} | {} | {} | {:.1}% | {} | {} | {} |\n",
                s.category,
                s.fetched_items,
                expected,
                s.completion_percent(),
                s.pages_fetched,
                s.pages_failed,
                if s.aborted { "yes" } else { "no" }
            ));
        }
        md.push('\n');
    }

    if let Some(load) = &summary.load {
        md.push_str("## Load\n\n");
        md.push_str(&format!(
            "- **Rows Loaded**: {} into `{}` and `{}`\n",
            load.rows_loaded, load.raw_table, load.fact_table
        ));
        md.push_str(&format!(
            "- **Duplicates Collapsed**: {}\n",
            load.duplicates_collapsed
        ));
        md.push_str(&format!("- **Keyless Rows**: {}\n", load.keyless_rows));
        let quality = &load.data_quality;
        if quality.total() > 0 {
            md.push_str(&format!(
                "- **Data Quality**: {} missing ids, {} malformed infoboxes, {} malformed tag lists, {} bad timestamps\n",
                quality.missing_subject_id,
                quality.malformed_infobox,
                quality.malformed_tags,
                quality.unparseable_timestamps
            ));
        }
        md.push('\n');
    }

    if let Some(sync) = &summary.sync {
        md.push_str("## Incremental Sync\n\n");
        if sync.counts.initial_load {
            md.push_str(&format!(
                "Initial load of `{}` with {} rows.\n\n",
                sync.target_table, sync.written_rows
            ));
        } else {
            md.push_str("| Inserts | Deletes | Updates | Net Change |\n");
            md.push_str("|---------|---------|---------|------------|\n");
            md.push_str(&format!(
                "| {} | {} | {} | {:+} |\n\n",
                sync.counts.inserts, sync.counts.deletes, sync.counts.updates, sync.counts.net_change
            ));
        }
    }

    if let Some(export) = &summary.export {
        md.push_str("## CSV Export\n\n");
        md.push_str(&format!(
            "{} rows written to `{}`.\n\n",
            export.rows, export.directory
        ));
    }

    if let Some(publish) = &summary.publish {
        md.push_str("## Publish\n\n");
        md.push_str(&format!("- **Database**: {}\n", publish.database_url));
        md.push_str(&format!("- **Created**: {}\n", publish.success_count));
        md.push_str(&format!("- **Failed**: {}\n", publish.error_count));
        if publish.skipped_existing > 0 {
            md.push_str(&format!(
                "- **Skipped (already present)**: {}\n",
                publish.skipped_existing
            ));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{FetchTotals, LoadReport};
    use crate::source::{CategoryKey, CategoryStats};
    use crate::sync::{SyncCounts, SyncReport};

    fn summary() -> RunSummary {
        let mut done = CategoryStats::new(CategoryKey::new(2, 2), 150);
        done.fetched_items = 150;
        done.pages_fetched = 2;
        let empty = CategoryStats::new(CategoryKey::new(6, 5), 0);
        let categories = vec![done, empty];

        RunSummary {
            run_id: 3,
            username: "sai".to_string(),
            status: "completed".to_string(),
            started_at: "2024-03-01T00:00:00+00:00".to_string(),
            finished_at: "2024-03-01T00:01:00+00:00".to_string(),
            duration_seconds: 60.0,
            config_hash: "abc".to_string(),
            totals: FetchTotals::from_stats(&categories),
            categories,
            load: Some(LoadReport {
                raw_table: "logs_raw".to_string(),
                fact_table: "logs".to_string(),
                rows_loaded: 150,
                ..LoadReport::default()
            }),
            sync: Some(SyncReport {
                source_table: "logs".to_string(),
                target_table: "logs_incremental".to_string(),
                source_rows: 150,
                previous_rows: 149,
                written_rows: 150,
                counts: SyncCounts {
                    inserts: 2,
                    deletes: 1,
                    updates: 148,
                    net_change: 1,
                    ..SyncCounts::default()
                },
            }),
            export: None,
            publish: None,
        }
    }

    #[test]
    fn test_format_markdown_report() {
        let md = format_markdown_report(&summary());

        assert!(md.starts_with("# Bangumi Collection Run: sai"));
        assert!(md.contains("- **Status**: completed"));
        assert!(md.contains("| 动画 - 看过 | 150 | 150 | 100.0% | 2 | 0 | no |"));
        // Empty categories are left out of the table
        assert!(!md.contains("三次元"));
        assert!(md.contains("| 2 | 1 | 148 | +1 |"));
        assert!(!md.contains("## Publish"));
        assert!(!md.contains("Unresolved Totals"));
    }

    #[test]
    fn test_unresolved_category_is_reported() {
        let mut summary = summary();
        summary
            .categories
            .push(CategoryStats::unresolved(CategoryKey::new(2, 3)));
        summary.totals = FetchTotals::from_stats(&summary.categories);

        let md = format_markdown_report(&summary);

        assert!(md.contains("- **Unresolved Totals**: 1 (not fetched)"));
        assert!(md.contains("| 动画 - 在看 | 0 | unknown | 0.0% | 0 | 0 | no |"));
        assert!(md.contains("- **Incomplete Categories**: 1 of 3"));
    }

    #[test]
    fn test_generate_markdown_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");

        generate_markdown_report(&summary(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("## Incremental Sync"));
    }
}
