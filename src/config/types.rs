use crate::source::CategoryKey;
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable consulted when `source.access-token` is not set
pub const ACCESS_TOKEN_ENV: &str = "BANGUMI_ACCESS_TOKEN";

/// Environment variable consulted when `notion.token` is not set
pub const NOTION_TOKEN_ENV: &str = "NOTION_TOKEN";

/// Main configuration structure for bangumi-etl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub notion: Option<NotionConfig>,
}

impl Config {
    /// Every (subject type, collection type) pair to fetch, subject type outermost
    pub fn categories(&self) -> Vec<CategoryKey> {
        CategoryKey::enumerate(&self.source.subject_types, &self.source.collection_types)
    }
}

/// Collection API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// API root (e.g., "https://api.bgm.tv")
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// User whose collection is fetched
    pub username: String,

    /// Bearer token; falls back to `BANGUMI_ACCESS_TOKEN`
    #[serde(rename = "access-token", default)]
    pub access_token: Option<String>,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Subject type codes (1 book, 2 anime, 3 music, 4 game, 6 real)
    #[serde(rename = "subject-types", default = "default_subject_types")]
    pub subject_types: Vec<u8>,

    /// Collection type codes (1 wish, 2 done, 3 doing, 4 on hold, 5 dropped)
    #[serde(rename = "collection-types", default = "default_collection_types")]
    pub collection_types: Vec<u8>,

    /// Items requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    #[serde(rename = "connect-timeout-secs", default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(rename = "read-timeout-secs", default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Idle connections kept per host
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: usize,
}

impl SourceConfig {
    /// Resolves the access token from the file or the environment
    ///
    /// A missing token is not an error: public collections can be read anonymously.
    pub fn resolve_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Retry and pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts per request before giving up on transient errors
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base; attempt `n` waits `base * 2^n`
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Fixed wait after HTTP 429
    #[serde(rename = "rate-limit-cooldown-ms", default = "default_cooldown_ms")]
    pub rate_limit_cooldown_ms: u64,

    /// Cooldowns allowed for one page before it counts as failed
    #[serde(rename = "max-rate-limit-waits", default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Failed pages in a row that abort a category
    #[serde(
        rename = "max-consecutive-failures",
        default = "default_max_consecutive_failures"
    )]
    pub max_consecutive_failures: u32,

    /// Pause between successful pages
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Pause between category total checks
    #[serde(rename = "category-delay-ms", default = "default_category_delay_ms")]
    pub category_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            rate_limit_cooldown_ms: default_cooldown_ms(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            max_consecutive_failures: default_max_consecutive_failures(),
            page_delay_ms: default_page_delay_ms(),
            category_delay_ms: default_category_delay_ms(),
        }
    }
}

/// Relational storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Base name of the fact table; raw and incremental tables derive from it
    #[serde(rename = "table-name", default = "default_table_name")]
    pub table_name: String,
}

impl StorageConfig {
    pub fn fact_table(&self) -> String {
        self.table_name.clone()
    }

    pub fn raw_table(&self) -> String {
        format!("{}_raw", self.table_name)
    }

    pub fn incremental_table(&self) -> String {
        format!("{}_incremental", self.table_name)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path of the JSON run summary
    #[serde(rename = "summary-path", default = "default_summary_path")]
    pub summary_path: String,

    /// Optional markdown category report
    #[serde(rename = "report-path", default)]
    pub report_path: Option<String>,

    /// Directory for the raw, analytics and category summary CSV files
    #[serde(rename = "export-dir", default)]
    pub export_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_path: default_summary_path(),
            report_path: None,
            export_dir: None,
        }
    }
}

/// Notion workspace configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    /// Integration token; falls back to `NOTION_TOKEN`
    #[serde(default)]
    pub token: Option<String>,

    /// Existing parent page; a new page is created under the workspace when absent
    #[serde(rename = "parent-id", default)]
    pub parent_id: Option<String>,

    /// Existing database; a new database is created under the parent when absent
    #[serde(rename = "database-id", default)]
    pub database_id: Option<String>,

    #[serde(rename = "api-base", default = "default_notion_api_base")]
    pub api_base: String,

    #[serde(rename = "notion-version", default = "default_notion_version")]
    pub notion_version: String,

    /// Skip rows whose subject id already exists in the database
    #[serde(rename = "skip-existing", default)]
    pub skip_existing: bool,

    #[serde(rename = "page-title", default = "default_page_title")]
    pub page_title: String,

    #[serde(rename = "database-title", default = "default_database_title")]
    pub database_title: String,
}

impl NotionConfig {
    /// Resolves the integration token from the file or the environment
    pub fn resolve_token(&self) -> Result<String, ConfigError> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(NOTION_TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ConfigError::MissingCredential(format!(
                    "notion.token is not set and {} is empty",
                    NOTION_TOKEN_ENV
                ))
            })
    }
}

fn default_base_url() -> String {
    "https://api.bgm.tv".to_string()
}

fn default_user_agent() -> String {
    format!("bangumi-etl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_subject_types() -> Vec<u8> {
    vec![1, 2, 3]
}

fn default_collection_types() -> Vec<u8> {
    vec![1, 2, 3, 4]
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pool_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_cooldown_ms() -> u64 {
    10_000
}

fn default_max_rate_limit_waits() -> u32 {
    10
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_page_delay_ms() -> u64 {
    500
}

fn default_category_delay_ms() -> u64 {
    300
}

fn default_table_name() -> String {
    "fact_view_logs".to_string()
}

fn default_summary_path() -> String {
    "run_summary.json".to_string()
}

fn default_notion_api_base() -> String {
    "https://api.notion.com".to_string()
}

fn default_notion_version() -> String {
    "2022-06-28".to_string()
}

fn default_page_title() -> String {
    "Bangumi Data Import".to_string()
}

fn default_database_title() -> String {
    "Bangumi Database".to_string()
}
