//! Storage traits and error types

use crate::model::{FactRow, RawRow};
use crate::source::CategoryStats;
use crate::storage::RunRecord;
use crate::storage::RunStatus;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Data tables are always replaced whole inside one transaction, so readers
/// never observe a half-written table.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Category Statistics =====

    /// Records the per-category statistics of a run
    fn record_category_stats(&mut self, run_id: i64, stats: &[CategoryStats])
        -> StorageResult<()>;

    /// Gets the per-category statistics of a run, in category order
    fn get_category_stats(&self, run_id: i64) -> StorageResult<Vec<CategoryStats>>;

    // ===== Data Tables =====

    /// Replaces the raw table with `rows`
    fn replace_raw_rows(&mut self, table: &str, rows: &[&RawRow]) -> StorageResult<usize>;

    /// Replaces a fact-shaped table with `rows`, preserving their order
    fn replace_fact_rows(&mut self, table: &str, rows: &[FactRow]) -> StorageResult<usize>;

    /// Reads a fact-shaped table in insertion order
    ///
    /// A table that does not exist yet reads as empty.
    fn read_fact_rows(&self, table: &str) -> StorageResult<Vec<FactRow>>;

    /// Counts the rows of a table; 0 when it does not exist
    fn count_rows(&self, table: &str) -> StorageResult<u64>;
}
