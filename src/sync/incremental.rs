//! Incremental table sync
//!
//! Reads the freshly loaded fact table and the previous incremental table,
//! reconciles them, and replaces the incremental table with the result.

use crate::storage::{Storage, StorageResult};
use crate::sync::reconcile::{reconcile, SyncCounts};
use serde::Serialize;

/// Outcome of one incremental sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub source_table: String,
    pub target_table: String,
    pub source_rows: usize,
    pub previous_rows: usize,
    pub written_rows: usize,
    #[serde(flatten)]
    pub counts: SyncCounts,
}

/// Converges `target_table` on the contents of `source_table`
pub fn sync_incremental(
    storage: &mut dyn Storage,
    source_table: &str,
    target_table: &str,
) -> StorageResult<SyncReport> {
    let source = storage.read_fact_rows(source_table)?;
    let previous = storage.read_fact_rows(target_table)?;

    let reconciliation = reconcile(&source, &previous);
    let counts = reconciliation.counts();

    if counts.initial_load {
        tracing::info!(
            "{} is empty, initial load of {} rows",
            target_table,
            source.len()
        );
    } else {
        tracing::info!(
            "Syncing {}: {} inserts, {} deletes, {} updates (net {:+})",
            target_table,
            counts.inserts,
            counts.deletes,
            counts.updates,
            counts.net_change
        );
    }

    if counts.target_keyless_dropped > 0 {
        tracing::warn!(
            "Dropped {} keyless rows from previous {}",
            counts.target_keyless_dropped,
            target_table
        );
    }

    let written_rows = storage.replace_fact_rows(target_table, &reconciliation.rows)?;

    Ok(SyncReport {
        source_table: source_table.to_string(),
        target_table: target_table.to_string(),
        source_rows: source.len(),
        previous_rows: previous.len(),
        written_rows,
        counts,
    })
}
