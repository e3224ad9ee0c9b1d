//! Integration tests for the collection transport and fetcher
//!
//! These tests run the real reqwest transport against wiremock servers.

use bangumi_etl::config::{parse_config, Config};
use bangumi_etl::source::{
    check_total, fetch_category, resolve_total, CategoryKey, CollectionTransport, FetchSettings,
    HttpTransport, RetryError, RetryPolicy,
};
use bangumi_etl::FetchError;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COLLECTIONS: &str = "/v0/users/sai/collections";

fn create_test_config(base_url: &str) -> Config {
    parse_config(&format!(
        r#"
[source]
base-url = "{}"
username = "sai"
access-token = "secret"
user-agent = "bangumi-etl-tests"
page-size = 2

[storage]
database-path = ":memory:"
"#,
        base_url
    ))
    .unwrap()
}

fn transport(server: &MockServer) -> HttpTransport {
    let config = create_test_config(&server.uri());
    HttpTransport::new(
        &config.source,
        RetryPolicy::transient(3, Duration::from_millis(10)),
    )
    .unwrap()
}

fn fast_settings() -> FetchSettings {
    FetchSettings {
        page_size: 2,
        retry: RetryPolicy::transient(2, Duration::from_millis(5)),
        rate_limit_cooldown: Duration::from_millis(10),
        max_rate_limit_waits: 2,
        max_consecutive_failures: 3,
        page_delay: Duration::ZERO,
    }
}

/// A collection page whose items carry the given subject ids
fn page_body(total: u64, ids: &[i64]) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "subject_id": id,
                "subject_type": 2,
                "type": 2,
                "updated_at": "2024-03-01T12:00:00+08:00",
                "ep_status": 12,
                "subject": {
                    "id": id,
                    "name": format!("subject {}", id),
                    "name_cn": format!("条目 {}", id),
                    "type": 2,
                    "score": 7.5,
                    "tags": [{"name": "原创", "count": 10}]
                }
            })
        })
        .collect();
    json!({ "total": total, "limit": 2, "offset": 0, "data": data })
}

#[tokio::test]
async fn test_transport_sends_category_query_and_auth() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .and(query_param("subject_type", "2"))
        .and(query_param("type", "3"))
        .and(query_param("limit", "1"))
        .and(query_param("offset", "0"))
        .and(header("authorization", "Bearer secret"))
        .and(header("user-agent", "bangumi-etl-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(42, &[7])))
        .expect(1)
        .mount(&server)
        .await;

    let page = transport(&server)
        .get_page(CategoryKey::new(2, 3), 1, 0)
        .await
        .unwrap();

    assert_eq!(page.total, 42);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].subject_id, Some(7));
}

#[tokio::test]
async fn test_transport_retries_transient_server_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1, &[1])))
        .expect(1)
        .mount(&server)
        .await;

    let page = transport(&server)
        .get_page(CategoryKey::new(2, 2), 2, 0)
        .await
        .unwrap();

    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_transport_gives_up_on_persistent_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = transport(&server)
        .get_page(CategoryKey::new(2, 2), 2, 0)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 502, .. }));
}

#[tokio::test]
async fn test_transport_surfaces_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server)
        .get_page(CategoryKey::new(2, 2), 2, 0)
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn test_transport_reports_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .get_page(CategoryKey::new(2, 2), 2, 0)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Malformed { .. }));
}

#[tokio::test]
async fn test_fetch_category_pages_through_server() {
    let server = MockServer::start().await;

    for (offset, ids) in [("0", vec![1, 2]), ("2", vec![3, 4]), ("4", vec![5])] {
        Mock::given(method("GET"))
            .and(path(COLLECTIONS))
            .and(query_param("offset", offset))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(5, &ids)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let fetch = fetch_category(
        &transport(&server),
        &fast_settings(),
        CategoryKey::new(2, 2),
        5,
    )
    .await;

    let ids: Vec<_> = fetch.items.iter().map(|i| i.subject_id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    assert_eq!(fetch.stats.pages_fetched, 3);
    assert!(fetch.stats.is_complete());
    assert_eq!(fetch.items[0].category, CategoryKey::new(2, 2));
}

#[tokio::test]
async fn test_fetch_category_skips_rejected_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(4, &[3, 4])))
        .mount(&server)
        .await;

    let fetch = fetch_category(
        &transport(&server),
        &fast_settings(),
        CategoryKey::new(2, 2),
        4,
    )
    .await;

    assert_eq!(fetch.items.len(), 2);
    assert_eq!(fetch.stats.pages_failed, 1);
    assert!(!fetch.stats.aborted);
    assert!(!fetch.stats.is_complete());
}

#[tokio::test]
async fn test_fetch_category_takes_rate_limit_cooldown() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1, &[9])))
        .mount(&server)
        .await;

    let fetch = fetch_category(
        &transport(&server),
        &fast_settings(),
        CategoryKey::new(1, 2),
        1,
    )
    .await;

    assert_eq!(fetch.items.len(), 1);
    assert_eq!(fetch.stats.rate_limit_waits, 1);
    assert_eq!(fetch.stats.pages_failed, 0);
}

#[tokio::test]
async fn test_resolve_total_treats_failure_as_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let total = resolve_total(
        &transport(&server),
        &RetryPolicy::transient(3, Duration::from_millis(5)),
        CategoryKey::new(4, 1),
    )
    .await;

    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_check_total_surfaces_rejected_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = check_total(
        &transport(&server),
        &RetryPolicy::transient(3, Duration::from_millis(5)),
        CategoryKey::new(4, 1),
    )
    .await;

    assert!(matches!(
        result,
        Err(RetryError::Fatal(FetchError::Status { status: 404, .. }))
    ));
}
