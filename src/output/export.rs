//! CSV export of a run's rows
//!
//! Writes three files into the export directory: the raw rows, the analytics
//! rows with their infobox and top-tag columns, and a per-category summary.
//! Files start with a UTF-8 byte order mark so spreadsheet tools pick up the
//! CJK titles correctly.

use crate::model::{AnalyticsRow, Snapshot, TOP_TAG_COUNT};
use crate::output::OutputResult;
use crate::source::CategoryStats;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const RAW_CSV: &str = "bangumi_raw_by_category.csv";
pub const ANALYTICS_CSV: &str = "bangumi_analytics_by_category.csv";
pub const CATEGORY_SUMMARY_CSV: &str = "bangumi_category_summary.csv";

const BOM: &[u8] = "\u{feff}".as_bytes();

/// Files written by [`export_csv`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub directory: String,
    pub files: Vec<String>,
    pub rows: usize,
}

#[derive(Serialize)]
struct CategorySummaryRecord {
    #[serde(rename = "Subject Type")]
    subject_type: String,
    #[serde(rename = "Collection Type")]
    collection_type: String,
    /// Empty when the total check failed
    #[serde(rename = "Total Items")]
    total_items: Option<u64>,
    #[serde(rename = "Fetched Items")]
    fetched_items: u64,
    #[serde(rename = "Pages Fetched")]
    pages_fetched: u32,
    #[serde(rename = "Pages Failed")]
    pages_failed: u32,
    #[serde(rename = "Completion %")]
    completion_percent: f64,
}

impl From<&CategoryStats> for CategorySummaryRecord {
    fn from(stats: &CategoryStats) -> Self {
        Self {
            subject_type: stats.category.subject_label().into_owned(),
            collection_type: stats.category.collection_label().into_owned(),
            total_items: (!stats.total_unresolved).then_some(stats.expected_total),
            fetched_items: stats.fetched_items,
            pages_fetched: stats.pages_fetched,
            pages_failed: stats.pages_failed,
            completion_percent: stats.completion_percent(),
        }
    }
}

/// Writes the raw, analytics and category summary CSV files
///
/// # Arguments
///
/// * `dir` - Export directory, created if missing
/// * `snapshot` - Rows of the run
/// * `categories` - Category statistics of the run
pub fn export_csv(
    dir: &Path,
    snapshot: &Snapshot,
    categories: &[CategoryStats],
) -> OutputResult<ExportReport> {
    fs::create_dir_all(dir)?;

    let raw_path = dir.join(RAW_CSV);
    let mut writer = csv_writer(&raw_path)?;
    for row in snapshot.raw_rows() {
        writer.serialize(row)?;
    }
    writer.flush()?;

    // Top tags are a nested list, so analytics rows are written field by field
    let analytics_path = dir.join(ANALYTICS_CSV);
    let mut writer = csv_writer(&analytics_path)?;
    writer.write_record(analytics_header())?;
    for row in snapshot.analytics_rows() {
        writer.write_record(analytics_record(row))?;
    }
    writer.flush()?;

    let summary_path = dir.join(CATEGORY_SUMMARY_CSV);
    let mut writer = csv_writer(&summary_path)?;
    for stats in categories {
        writer.serialize(CategorySummaryRecord::from(stats))?;
    }
    writer.flush()?;

    tracing::info!("Exported {} rows as CSV to {}", snapshot.len(), dir.display());

    Ok(ExportReport {
        directory: dir.display().to_string(),
        files: [raw_path, analytics_path, summary_path]
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        rows: snapshot.len(),
    })
}

fn csv_writer(path: &Path) -> OutputResult<csv::Writer<BufWriter<File>>> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(BOM)?;
    Ok(csv::Writer::from_writer(file))
}

fn analytics_header() -> Vec<String> {
    let mut header: Vec<String> = [
        "subject_id",
        "subject_type",
        "collection_type",
        "name_cn",
        "score",
        "rank",
        "collection_total",
        "created_at",
        "updated_at",
        "eps",
        "air_date",
        "director",
        "studio",
        "country",
        "publisher",
        "author",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for i in 1..=TOP_TAG_COUNT {
        header.push(format!("tag_{}_name", i));
        header.push(format!("tag_{}_count", i));
    }
    header.push("all_tags".to_string());
    header
}

fn field<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn analytics_record(row: &AnalyticsRow) -> Vec<String> {
    let mut record = vec![
        field(&row.subject_id),
        row.subject_type.to_string(),
        row.collection_type.to_string(),
        field(&row.name_cn),
        field(&row.score),
        field(&row.rank),
        field(&row.collection_total),
        field(&row.created_at),
        field(&row.updated_at),
        field(&row.eps),
        field(&row.air_date),
        field(&row.director),
        field(&row.studio),
        field(&row.country),
        field(&row.publisher),
        field(&row.author),
    ];

    for i in 0..TOP_TAG_COUNT {
        let tag = row.top_tags.get(i);
        record.push(tag.map(|t| field(&t.name)).unwrap_or_default());
        record.push(tag.map(|t| field(&t.count)).unwrap_or_default());
    }
    record.push(field(&row.all_tags));
    record
}
