use crate::config::types::{
    Config, NotionConfig, OutputConfig, RetryConfig, SourceConfig, StorageConfig,
};
use crate::source::{COLLECTION_TYPE_CODES, SUBJECT_TYPE_CODES};
use crate::storage::is_valid_table_name;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_retry_config(&config.retry)?;
    validate_storage_config(&config.storage)?;
    validate_output_config(&config.output)?;
    if let Some(notion) = &config.notion {
        validate_notion_config(notion)?;
    }
    Ok(())
}

/// Validates collection API configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;

    if config.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "username cannot be empty".to_string(),
        ));
    }

    if config.username.contains('/') {
        return Err(ConfigError::Validation(format!(
            "username must not contain '/', got '{}'",
            config.username
        )));
    }

    if config.subject_types.is_empty() {
        return Err(ConfigError::Validation(
            "subject-types must list at least one code".to_string(),
        ));
    }

    for code in &config.subject_types {
        if !SUBJECT_TYPE_CODES.contains(code) {
            return Err(ConfigError::Validation(format!(
                "unknown subject type code {} (expected one of {:?})",
                code, SUBJECT_TYPE_CODES
            )));
        }
    }

    if config.collection_types.is_empty() {
        return Err(ConfigError::Validation(
            "collection-types must list at least one code".to_string(),
        ));
    }

    for code in &config.collection_types {
        if !COLLECTION_TYPE_CODES.contains(code) {
            return Err(ConfigError::Validation(format!(
                "unknown collection type code {} (expected one of {:?})",
                code, COLLECTION_TYPE_CODES
            )));
        }
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.connect_timeout_secs == 0 || config.read_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeouts must be at least one second".to_string(),
        ));
    }

    if config.pool_size < 1 {
        return Err(ConfigError::Validation(format!(
            "pool-size must be >= 1, got {}",
            config.pool_size
        )));
    }

    Ok(())
}

/// Validates retry and pacing configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.max_consecutive_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max-consecutive-failures must be >= 1, got {}",
            config.max_consecutive_failures
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    // Table names are interpolated into SQL
    if !is_valid_table_name(&config.table_name) {
        return Err(ConfigError::Validation(format!(
            "table-name must be an identifier of letters, digits and underscores, got '{}'",
            config.table_name
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary-path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.report_path, Some(p) if p.is_empty()) {
        return Err(ConfigError::Validation(
            "report-path cannot be empty when set".to_string(),
        ));
    }

    if matches!(&config.export_dir, Some(p) if p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "export-dir cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates Notion configuration
fn validate_notion_config(config: &NotionConfig) -> Result<(), ConfigError> {
    validate_http_url("notion.api-base", &config.api_base)?;

    if config.notion_version.is_empty() {
        return Err(ConfigError::Validation(
            "notion-version cannot be empty".to_string(),
        ));
    }

    for (field, value) in [
        ("parent-id", &config.parent_id),
        ("database-id", &config.database_id),
    ] {
        if matches!(value, Some(id) if id.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "notion.{} cannot be empty when set",
                field
            )));
        }
    }

    Ok(())
}

/// Checks that a URL parses and uses http or https
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", field, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}
