//! HTTP transport for the collection API
//!
//! This module handles every request made against the source API, including:
//! - Building the pooled HTTP client with auth and user agent headers
//! - Building the collections endpoint for a user
//! - Retrying transient server statuses (500/502/503/504)
//! - Classifying failures into the fetch error taxonomy
//!
//! The rest of the crate talks to the API through [`CollectionTransport`],
//! which keeps the fetcher testable with scripted fakes.

use crate::config::SourceConfig;
use crate::model::CollectionPage;
use crate::source::{CategoryKey, RetryPolicy};
use crate::{ConfigError, EtlError, FetchError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::future::Future;
use url::Url;

/// Source of collection pages
pub trait CollectionTransport {
    /// Requests one page of a category
    fn get_page(
        &self,
        category: CategoryKey,
        limit: u32,
        offset: u64,
    ) -> impl Future<Output = Result<CollectionPage, FetchError>> + Send;
}

/// Query string of a page request
#[derive(Debug, Serialize)]
struct PageQuery {
    subject_type: u8,
    #[serde(rename = "type")]
    collection_type: u8,
    limit: u32,
    offset: u64,
}

/// Pooled reqwest transport
///
/// One instance is created per run and reused for every request; the pool is
/// released when the transport is dropped.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    server_retry: RetryPolicy,
}

impl HttpTransport {
    /// Creates a transport for the configured user
    ///
    /// `server_retry` governs the automatic retry of transient server statuses.
    pub fn new(config: &SourceConfig, server_retry: RetryPolicy) -> Result<Self, EtlError> {
        let client = build_http_client(config)?;
        let endpoint = collections_endpoint(&config.base_url, &config.username)?;

        Ok(Self {
            client,
            endpoint,
            server_retry,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send_once(&self, query: &PageQuery) -> Result<reqwest::Response, FetchError> {
        self.client
            .get(self.endpoint.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(self.endpoint.as_str(), e))
    }
}

impl CollectionTransport for HttpTransport {
    async fn get_page(
        &self,
        category: CategoryKey,
        limit: u32,
        offset: u64,
    ) -> Result<CollectionPage, FetchError> {
        let url = self.endpoint.as_str();
        let query = PageQuery {
            subject_type: category.subject_type,
            collection_type: category.collection_type,
            limit,
            offset,
        };

        let mut attempt = 0;
        let response = loop {
            let response = self.send_once(&query).await?;
            let status = response.status();

            if is_transient_status(status) && attempt + 1 < self.server_retry.max_attempts() {
                let delay = self.server_retry.delay_for(attempt);
                tracing::debug!(
                    "HTTP {} from {} (offset {}), retrying in {:?}",
                    status.as_u16(),
                    url,
                    offset,
                    delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            break response;
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        serde_json::from_str(&body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Statuses retried by the transport itself
fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Builds the collections endpoint for a user
///
/// # Example
///
/// ```
/// use bangumi_etl::source::collections_endpoint;
///
/// let url = collections_endpoint("https://api.bgm.tv", "sai").unwrap();
/// assert_eq!(url.as_str(), "https://api.bgm.tv/v0/users/sai/collections");
/// ```
pub fn collections_endpoint(base_url: &str, username: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(["v0", "users", username, "collections"]);
    Ok(url)
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The source configuration
///
/// # Returns
///
/// * `Ok(Client)` - Client with pooling, timeouts and default headers
/// * `Err(EtlError)` - Invalid token or client construction failure
pub fn build_http_client(config: &SourceConfig) -> Result<Client, EtlError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(token) = config.resolve_access_token() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            ConfigError::Validation("access token contains invalid header characters".to_string())
        })?;
        headers.insert(AUTHORIZATION, value);
    } else {
        tracing::debug!("No access token configured, requesting anonymously");
    }

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .connect_timeout(config.connect_timeout())
        .timeout(config.connect_timeout() + config.read_timeout())
        .pool_max_idle_per_host(config.pool_size)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}
