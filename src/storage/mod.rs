//! Storage module for loaded rows and run bookkeeping
//!
//! This module handles all database operations of the pipeline, including:
//! - SQLite database initialization and schema management
//! - Whole-table replacement of the raw, fact and incremental tables
//! - Run tracking and per-category statistics

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::StorageConfig;
use crate::EtlError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(EtlError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, EtlError> {
    SqliteStorage::new(path)
}

/// Checks that a table name is a plain SQL identifier
///
/// Table names are interpolated into statements, so only ASCII letters,
/// digits and underscores are accepted, and the first character must not be
/// a digit.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Names of the three data tables of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub raw: String,
    pub fact: String,
    pub incremental: String,
}

impl TableNames {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            raw: config.raw_table(),
            fact: config.fact_table(),
            incremental: config.incremental_table(),
        }
    }
}

/// Represents a pipeline run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Every category fetched completely
    Completed,
    /// Loaded, but at least one category skipped pages or aborted
    Partial,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
