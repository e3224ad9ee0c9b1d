//! Pipeline coordinator - run orchestration logic
//!
//! Drives one run from total resolution through publishing. Every stage is
//! awaited in turn; the transport handle lives as long as the pipeline and is
//! released by drop on every exit path.

use crate::config::Config;
use crate::model::{CollectionItem, FactRow, RawRow, Snapshot};
use crate::output::{export_csv, ExportReport, FetchTotals, LoadReport, RunSummary};
use crate::publish::{publish, PublishReport};
use crate::source::{
    fetch_category, resolve_all_totals, CategoryStats, CollectionTransport, FetchSettings,
    HttpTransport, RetryPolicy,
};
use crate::storage::{open_storage, RunStatus, SqliteStorage, Storage, TableNames};
use crate::sync::{sync_incremental, SyncReport};
use crate::EtlError;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

/// Per-run switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Publish fact rows when a `[notion]` section is configured
    pub publish: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { publish: true }
    }
}

/// What the stages produced, before the run is closed
struct RunOutcome {
    status: RunStatus,
    categories: Vec<CategoryStats>,
    load: Option<LoadReport>,
    sync: Option<SyncReport>,
    export: Option<ExportReport>,
    publish: Option<PublishReport>,
}

/// Main pipeline coordinator structure
pub struct Pipeline<T, S> {
    config: Config,
    config_hash: String,
    transport: T,
    storage: S,
    tables: TableNames,
}

impl Pipeline<HttpTransport, SqliteStorage> {
    /// Creates a pipeline against the configured API and database
    ///
    /// # Arguments
    ///
    /// * `config` - The pipeline configuration
    /// * `config_hash` - Recorded on each run row
    ///
    /// # Returns
    ///
    /// * `Ok(Pipeline)` - Transport built and database opened
    /// * `Err(EtlError)` - Failed to initialize
    pub fn from_config(config: Config, config_hash: String) -> Result<Self, EtlError> {
        let storage = open_storage(Path::new(&config.storage.database_path))?;
        let transport =
            HttpTransport::new(&config.source, RetryPolicy::from_config(&config.retry))?;
        tracing::debug!("Collection endpoint: {}", transport.endpoint());

        Ok(Self::new(config, config_hash, transport, storage))
    }
}

impl<T, S> Pipeline<T, S>
where
    T: CollectionTransport,
    S: Storage,
{
    pub fn new(config: Config, config_hash: String, transport: T, storage: S) -> Self {
        let tables = TableNames::from_config(&config.storage);
        Self {
            config,
            config_hash,
            transport,
            storage,
            tables,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Runs every stage once and closes the run
    ///
    /// Failures that abort a stage mark the run failed before propagating.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunSummary, EtlError> {
        let run_id = self.storage.create_run(&self.config_hash)?;
        let clock = Instant::now();
        tracing::info!(
            "Starting run {} for user {}",
            run_id,
            self.config.source.username
        );

        let outcome = match self.execute(run_id, options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Run {} failed: {}", run_id, e);
                if let Err(mark) = self.storage.finish_run(run_id, RunStatus::Failed) {
                    tracing::error!("Could not mark run {} failed: {}", run_id, mark);
                }
                return Err(e);
            }
        };

        self.storage.finish_run(run_id, outcome.status)?;
        let record = self.storage.get_run(run_id)?;
        let duration = clock.elapsed();

        tracing::info!(
            "Run {} {} in {:.1}s",
            run_id,
            outcome.status.to_db_string(),
            duration.as_secs_f64()
        );

        Ok(RunSummary {
            run_id,
            username: self.config.source.username.clone(),
            status: outcome.status.to_db_string().to_string(),
            started_at: record.started_at,
            finished_at: record.finished_at.unwrap_or_default(),
            duration_seconds: duration.as_secs_f64(),
            config_hash: record.config_hash,
            totals: FetchTotals::from_stats(&outcome.categories),
            categories: outcome.categories,
            load: outcome.load,
            sync: outcome.sync,
            export: outcome.export,
            publish: outcome.publish,
        })
    }

    async fn execute(&mut self, run_id: i64, options: RunOptions) -> Result<RunOutcome, EtlError> {
        let (categories, items) = self.fetch_all().await;
        self.storage.record_category_stats(run_id, &categories)?;

        let mut outcome = RunOutcome {
            status: if categories.iter().all(CategoryStats::is_complete) {
                RunStatus::Completed
            } else {
                RunStatus::Partial
            },
            categories,
            load: None,
            sync: None,
            export: None,
            publish: None,
        };

        let snapshot = self.build_snapshot(&items, &outcome.categories);
        if snapshot.is_empty() {
            tracing::warn!(
                "No rows fetched; leaving {} and {} untouched",
                self.tables.fact,
                self.tables.incremental
            );
            outcome.status = RunStatus::Failed;
            return Ok(outcome);
        }

        let facts = snapshot.fact_rows();
        outcome.load = Some(self.load(&snapshot, &facts)?);
        outcome.sync = Some(sync_incremental(
            &mut self.storage,
            &self.tables.fact,
            &self.tables.incremental,
        )?);

        if let Some(dir) = &self.config.output.export_dir {
            // Export failures do not fail the run
            match export_csv(Path::new(dir), &snapshot, &outcome.categories) {
                Ok(report) => outcome.export = Some(report),
                Err(e) => tracing::warn!("CSV export to {} failed: {}", dir, e),
            }
        }

        if options.publish {
            match &self.config.notion {
                Some(notion) => {
                    outcome.publish = Some(publish(notion, &self.config.retry, &facts).await?);
                }
                None => tracing::info!("No [notion] section, skipping publish"),
            }
        }

        Ok(outcome)
    }

    /// Resolves every total, then fetches the non-empty categories in order
    async fn fetch_all(&self) -> (Vec<CategoryStats>, Vec<CollectionItem>) {
        let retry = &self.config.retry;
        let category_delay = Duration::from_millis(retry.category_delay_ms);
        let policy = RetryPolicy::from_config(retry);
        let settings = FetchSettings::from_config(&self.config.source, retry);

        let totals = resolve_all_totals(
            &self.transport,
            &policy,
            &self.config.categories(),
            category_delay,
        )
        .await;

        let mut all_stats = Vec::with_capacity(totals.len());
        let mut items = Vec::new();
        let mut fetched_any = false;

        for stats in totals {
            if stats.expected_total == 0 {
                all_stats.push(stats);
                continue;
            }

            if fetched_any && !category_delay.is_zero() {
                tokio::time::sleep(category_delay).await;
            }
            fetched_any = true;

            tracing::info!(
                "Fetching {} ({} items)",
                stats.category,
                stats.expected_total
            );
            let fetch = fetch_category(
                &self.transport,
                &settings,
                stats.category,
                stats.expected_total,
            )
            .await;
            items.extend(fetch.items);
            all_stats.push(fetch.stats);
        }

        (all_stats, items)
    }

    fn build_snapshot(&self, items: &[CollectionItem], categories: &[CategoryStats]) -> Snapshot {
        let mut snapshot = Snapshot::new(self.config.source.username.clone());
        snapshot.extend(items);

        let quality = snapshot.quality();
        tracing::info!(
            "Snapshot of {} rows from {} categories ({} duplicates collapsed)",
            snapshot.len(),
            categories.iter().filter(|s| s.fetched_items > 0).count(),
            snapshot.duplicates()
        );
        if quality.total() > 0 {
            tracing::warn!(
                "Data quality: {} missing ids, {} malformed infoboxes, {} malformed tag lists, {} bad timestamps",
                quality.missing_subject_id,
                quality.malformed_infobox,
                quality.malformed_tags,
                quality.unparseable_timestamps
            );
        }
        snapshot
    }

    /// Replaces the raw and fact tables with the snapshot
    fn load(&mut self, snapshot: &Snapshot, facts: &[FactRow]) -> Result<LoadReport, EtlError> {
        let raw: Vec<&RawRow> = snapshot.raw_rows().collect();
        self.storage.replace_raw_rows(&self.tables.raw, &raw)?;
        let rows_loaded = self.storage.replace_fact_rows(&self.tables.fact, facts)?;

        tracing::info!(
            "Loaded {} rows into {} and {}",
            rows_loaded,
            self.tables.raw,
            self.tables.fact
        );

        Ok(LoadReport {
            raw_table: self.tables.raw.clone(),
            fact_table: self.tables.fact.clone(),
            rows_loaded,
            duplicates_collapsed: snapshot.duplicates(),
            keyless_rows: snapshot.keyless(),
            data_quality: snapshot.quality(),
        })
    }
}
