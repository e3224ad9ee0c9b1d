//! Configuration module for bangumi-etl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use bangumi_etl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Fetching collections for: {}", config.source.username);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, NotionConfig, OutputConfig, RetryConfig, SourceConfig, StorageConfig,
    ACCESS_TOKEN_ENV, NOTION_TOKEN_ENV,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
