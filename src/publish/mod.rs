//! Downstream publishing into a Notion database
//!
//! This module handles propagation of fact rows, including:
//! - Ensuring the parent page and the database exist
//! - Looking up records already present in the database
//! - Creating one record per row, sequentially
//!
//! Row failures are counted and logged but never stop the remaining rows.
//! Nothing is rolled back.

mod client;
mod properties;

pub use client::{NotionClient, QueryResponse, QUERY_PAGE_SIZE};
pub use properties::{database_schema, page_title, row_properties, TEXT_LIMIT, UNTITLED};

use crate::config::{NotionConfig, RetryConfig};
use crate::model::FactRow;
use crate::source::RetryPolicy;
use crate::EtlError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors from the Notion API
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("Connection error for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Notion API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed Notion response: {0}")]
    Malformed(String),

    #[error("Notion request failed: {0}")]
    Request(String),
}

impl PublishError {
    /// Connection and timeout failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }

    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if error.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else {
            Self::Request(format!("{}: {}", url, error))
        }
    }
}

/// Outcome of publishing a batch of rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub parent_page_id: String,
    pub database_id: String,
    pub database_url: String,
    pub existing_records: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub skipped_existing: usize,
}

/// Browser URL of a database
///
/// # Example
///
/// ```
/// use bangumi_etl::publish::database_url;
///
/// assert_eq!(
///     database_url("1a2b-3c4d"),
///     "https://notion.so/1a2b3c4d"
/// );
/// ```
pub fn database_url(database_id: &str) -> String {
    format!("https://notion.so/{}", database_id.replace('-', ""))
}

/// Retry policy for database queries, built from the shared retry settings
pub fn query_retry_policy(config: &RetryConfig) -> RetryPolicy<PublishError> {
    RetryPolicy::new(
        config.max_attempts,
        Duration::from_millis(config.base_delay_ms),
        PublishError::is_transient,
    )
}

/// Returns the configured parent page or creates one under the workspace
pub async fn ensure_parent_page(
    client: &NotionClient,
    config: &NotionConfig,
) -> Result<String, PublishError> {
    if let Some(id) = &config.parent_id {
        tracing::info!("Using existing page {}", id);
        return Ok(id.clone());
    }

    tracing::info!("Creating parent page '{}'", config.page_title);
    let id = client.create_workspace_page(&config.page_title).await?;
    tracing::info!("Created page {}", id);
    Ok(id)
}

/// Returns the configured database or creates one under `parent_id`
pub async fn ensure_database(
    client: &NotionClient,
    config: &NotionConfig,
    parent_id: &str,
) -> Result<String, PublishError> {
    if let Some(id) = &config.database_id {
        tracing::info!("Using existing database {}", id);
        return Ok(id.clone());
    }

    tracing::info!("Creating database '{}'", config.database_title);
    let id = client
        .create_database(parent_id, &config.database_title, database_schema())
        .await?;
    tracing::info!("Created database {}", id);
    Ok(id)
}

/// Collects the records of a database, keyed by title
///
/// Each query page is retried on connection errors. A page that still fails
/// ends the lookup with whatever was collected so far.
pub async fn fetch_existing_records(
    client: &NotionClient,
    policy: &RetryPolicy<PublishError>,
    database_id: &str,
) -> BTreeMap<String, String> {
    let mut records = BTreeMap::new();
    let mut cursor: Option<String> = None;

    loop {
        let result = policy
            .run("database query", |_| {
                client.query_database(database_id, cursor.as_deref())
            })
            .await;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(
                    "Existing-record lookup stopped after {} records: {}",
                    records.len(),
                    e.into_inner()
                );
                break;
            }
        };

        for result in &page.results {
            match (page_title(result), result.get("id").and_then(|v| v.as_str())) {
                (Some(title), Some(id)) => {
                    records.insert(title, id.to_string());
                }
                _ => tracing::warn!("Skipping unreadable database record"),
            }
        }
        tracing::debug!("Fetched {} existing records so far", records.len());

        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }

    tracing::info!("{} existing records in database", records.len());
    records
}

/// Row counters of one publish pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowOutcome {
    pub success: usize,
    pub errors: usize,
    pub skipped: usize,
}

/// Creates one record per row, in order
///
/// Rows whose subject id is a key of `existing` are skipped.
pub async fn publish_rows(
    client: &NotionClient,
    database_id: &str,
    rows: &[FactRow],
    existing: Option<&BTreeMap<String, String>>,
) -> RowOutcome {
    let mut outcome = RowOutcome::default();
    let total = rows.len();

    for (index, row) in rows.iter().enumerate() {
        let key = row.subject_id.map(|id| id.to_string());
        if let (Some(existing), Some(key)) = (existing, &key) {
            if existing.contains_key(key) {
                outcome.skipped += 1;
                continue;
            }
        }

        match client.create_record(database_id, row_properties(row)).await {
            Ok(_) => {
                outcome.success += 1;
                if (index + 1) % 10 == 0 {
                    tracing::info!("Inserted {}/{} rows", index + 1, total);
                }
            }
            Err(e) => {
                outcome.errors += 1;
                tracing::error!(
                    "Failed row {} (subject {}): {}",
                    index + 1,
                    key.as_deref().unwrap_or(UNTITLED),
                    e
                );
            }
        }
    }

    tracing::info!(
        "Publish complete: {} succeeded, {} failed, {} skipped",
        outcome.success,
        outcome.errors,
        outcome.skipped
    );
    outcome
}

/// Publishes `rows` into the configured workspace
///
/// Failing to set up the page or the database aborts; row failures do not.
pub async fn publish(
    config: &NotionConfig,
    retry: &RetryConfig,
    rows: &[FactRow],
) -> Result<PublishReport, EtlError> {
    let token = config.resolve_token()?;
    let client = NotionClient::new(config, &token)?;

    let parent_page_id = ensure_parent_page(&client, config).await?;
    let database_id = ensure_database(&client, config, &parent_page_id).await?;

    let existing = if config.skip_existing {
        Some(fetch_existing_records(&client, &query_retry_policy(retry), &database_id).await)
    } else {
        None
    };

    tracing::info!("Publishing {} rows to {}", rows.len(), database_id);
    let outcome = publish_rows(&client, &database_id, rows, existing.as_ref()).await;

    Ok(PublishReport {
        database_url: database_url(&database_id),
        parent_page_id,
        database_id,
        existing_records: existing.map(|e| e.len()).unwrap_or(0),
        success_count: outcome.success,
        error_count: outcome.errors,
        skipped_existing: outcome.skipped,
    })
}
