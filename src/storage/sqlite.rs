//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{FactRow, RawRow};
use crate::source::{CategoryKey, CategoryStats};
use crate::storage::schema::{
    initialize_schema, insert_sql, recreate_table_sql, FACT_COLUMNS, FACT_COLUMN_COUNT,
    RAW_COLUMNS, RAW_COLUMN_COUNT,
};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{is_valid_table_name, RunRecord, RunStatus};
use crate::EtlError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(EtlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, EtlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, EtlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn table_exists(&self, table: &str) -> StorageResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Rejects table names that are not plain identifiers
fn checked_table(table: &str) -> StorageResult<&str> {
    if is_valid_table_name(table) {
        Ok(table)
    } else {
        Err(StorageError::InvalidTableName(table.to_string()))
    }
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<(RunRecord, String)> {
    let status: String = row.get(4)?;
    Ok((
        RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: RunStatus::Running,
        },
        status,
    ))
}

fn with_status((mut run, status): (RunRecord, String)) -> StorageResult<RunRecord> {
    run.status = RunStatus::from_db_string(&status).ok_or_else(|| {
        StorageError::CorruptRecord(format!("run {} has unknown status '{}'", run.id, status))
    })?;
    Ok(run)
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<FactRow> {
    Ok(FactRow {
        subject_id: row.get(0)?,
        subject_type: row.get(1)?,
        collection_type: row.get(2)?,
        name_cn: row.get(3)?,
        score: row.get(4)?,
        rank: row.get(5)?,
        collection_total: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        eps: row.get(9)?,
        air_date: row.get(10)?,
        all_tags: row.get(11)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))?;

        with_status(run)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?
            .map(with_status)
            .transpose()
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Category Statistics =====

    fn record_category_stats(
        &mut self,
        run_id: i64,
        stats: &[CategoryStats],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO category_stats (run_id, subject_type, collection_type,
                 expected_total, fetched_items, pages_fetched, pages_failed, rate_limit_waits,
                 consecutive_failures, aborted, total_unresolved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;

            for s in stats {
                stmt.execute(params![
                    run_id,
                    s.category.subject_type,
                    s.category.collection_type,
                    to_db_int(s.expected_total),
                    to_db_int(s.fetched_items),
                    s.pages_fetched,
                    s.pages_failed,
                    s.rate_limit_waits,
                    s.consecutive_failures,
                    s.aborted,
                    s.total_unresolved,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_category_stats(&self, run_id: i64) -> StorageResult<Vec<CategoryStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_type, collection_type, expected_total, fetched_items, pages_fetched,
             pages_failed, rate_limit_waits, consecutive_failures, aborted, total_unresolved
             FROM category_stats WHERE run_id = ?1
             ORDER BY subject_type, collection_type",
        )?;

        let stats = stmt
            .query_map(params![run_id], |row| {
                Ok(CategoryStats {
                    category: CategoryKey::new(row.get(0)?, row.get(1)?),
                    expected_total: from_db_int(row.get(2)?),
                    fetched_items: from_db_int(row.get(3)?),
                    pages_fetched: row.get(4)?,
                    pages_failed: row.get(5)?,
                    rate_limit_waits: row.get(6)?,
                    consecutive_failures: row.get(7)?,
                    aborted: row.get(8)?,
                    total_unresolved: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    // ===== Data Tables =====

    fn replace_raw_rows(&mut self, table: &str, rows: &[&RawRow]) -> StorageResult<usize> {
        let table = checked_table(table)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&recreate_table_sql(table, RAW_COLUMNS))?;
        {
            let mut stmt = tx.prepare(&insert_sql(table, RAW_COLUMN_COUNT))?;
            for r in rows {
                stmt.execute(params![
                    r.user_id,
                    r.subject_id,
                    r.subject_type,
                    r.collection_type,
                    r.created_at,
                    r.updated_at,
                    r.ep_status,
                    r.vol_status,
                    r.name,
                    r.name_cn,
                    r.score,
                    r.rank,
                    r.collection_total,
                    r.eps,
                    r.volumes,
                    r.date,
                    r.subject_kind,
                    r.short_summary,
                    r.tags,
                    r.tags_raw,
                    r.infobox_raw,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Replaced {} with {} rows", table, rows.len());
        Ok(rows.len())
    }

    fn replace_fact_rows(&mut self, table: &str, rows: &[FactRow]) -> StorageResult<usize> {
        let table = checked_table(table)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&recreate_table_sql(table, FACT_COLUMNS))?;
        {
            let mut stmt = tx.prepare(&insert_sql(table, FACT_COLUMN_COUNT))?;
            for r in rows {
                stmt.execute(params![
                    r.subject_id,
                    r.subject_type,
                    r.collection_type,
                    r.name_cn,
                    r.score,
                    r.rank,
                    r.collection_total,
                    r.created_at,
                    r.updated_at,
                    r.eps,
                    r.air_date,
                    r.all_tags,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Replaced {} with {} rows", table, rows.len());
        Ok(rows.len())
    }

    fn read_fact_rows(&self, table: &str) -> StorageResult<Vec<FactRow>> {
        let table = checked_table(table)?;
        if !self.table_exists(table)? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT subject_id, subject_type, collection_type, name_cn, score, rank,
             collection_total, created_at, updated_at, eps, air_date, all_tags
             FROM \"{}\" ORDER BY rowid",
            table
        ))?;

        let rows = stmt
            .query_map([], fact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn count_rows(&self, table: &str) -> StorageResult<u64> {
        let table = checked_table(table)?;
        if !self.table_exists(table)? {
            return Ok(0);
        }

        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
                    row.get(0)
                })?;
        Ok(from_db_int(count))
    }
}
