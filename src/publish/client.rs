//! Minimal Notion API client

use crate::config::NotionConfig;
use crate::publish::PublishError;
use crate::EtlError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;

/// Page size of database queries
pub const QUERY_PAGE_SIZE: u32 = 100;

/// One page of `POST /v1/databases/{id}/query`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// Authenticated client for the Notion REST API
#[derive(Debug, Clone)]
pub struct NotionClient {
    client: Client,
    api_base: Url,
}

impl NotionClient {
    /// Creates a client for `config` authenticated with `token`
    pub fn new(config: &NotionConfig, token: &str) -> Result<Self, EtlError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                crate::ConfigError::Validation(
                    "notion token contains invalid header characters".to_string(),
                )
            })?,
        );
        headers.insert(
            HeaderName::from_static("notion-version"),
            HeaderValue::from_str(&config.notion_version).map_err(|_| {
                crate::ConfigError::Validation(format!(
                    "invalid notion-version '{}'",
                    config.notion_version
                ))
            })?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: Url::parse(&config.api_base)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PublishError> {
        self.api_base
            .join(path)
            .map_err(|e| PublishError::Request(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, PublishError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| PublishError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PublishError::from_reqwest(url.as_str(), e))?;

        if !status.is_success() {
            return Err(PublishError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| PublishError::Malformed(e.to_string()))
    }

    async fn post_created(&self, path: &str, body: &Value) -> Result<String, PublishError> {
        let value = self.post_json(path, body).await?;
        let created: Created =
            serde_json::from_value(value).map_err(|e| PublishError::Malformed(e.to_string()))?;
        Ok(created.id)
    }

    /// Creates a top-level workspace page and returns its id
    pub async fn create_workspace_page(&self, title: &str) -> Result<String, PublishError> {
        let body = json!({
            "parent": {"type": "workspace", "workspace": true},
            "properties": {
                "title": {"title": [{"text": {"content": title}}]}
            }
        });
        self.post_created("/v1/pages", &body).await
    }

    /// Creates a database under `parent_id` and returns its id
    pub async fn create_database(
        &self,
        parent_id: &str,
        title: &str,
        schema: Value,
    ) -> Result<String, PublishError> {
        let body = json!({
            "parent": {"type": "page_id", "page_id": parent_id},
            "title": [{"type": "text", "text": {"content": title}}],
            "properties": schema
        });
        self.post_created("/v1/databases", &body).await
    }

    /// Fetches one page of database records
    pub async fn query_database(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<QueryResponse, PublishError> {
        let mut body = json!({ "page_size": QUERY_PAGE_SIZE });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }

        let value = self
            .post_json(&format!("/v1/databases/{}/query", database_id), &body)
            .await?;
        serde_json::from_value(value).map_err(|e| PublishError::Malformed(e.to_string()))
    }

    /// Creates one database record and returns its page id
    pub async fn create_record(
        &self,
        database_id: &str,
        properties: Map<String, Value>,
    ) -> Result<String, PublishError> {
        let body = json!({
            "parent": {"database_id": database_id},
            "properties": properties
        });
        self.post_created("/v1/pages", &body).await
    }
}
