//! Integration tests for the Notion publisher
//!
//! A wiremock server stands in for the Notion API.

use bangumi_etl::config::{parse_config, NotionConfig, RetryConfig};
use bangumi_etl::model::FactRow;
use bangumi_etl::pipeline::{run_pipeline, RunOptions};
use bangumi_etl::publish::{fetch_existing_records, publish, query_retry_policy, NotionClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn notion_config(api_base: &str, extra: &str) -> NotionConfig {
    parse_config(&format!(
        r#"
[source]
username = "sai"

[storage]
database-path = ":memory:"

[notion]
token = "secret"
api-base = "{}"
{}
"#,
        api_base, extra
    ))
    .unwrap()
    .notion
    .unwrap()
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay_ms: 5,
        ..RetryConfig::default()
    }
}

fn fact(id: i64) -> FactRow {
    FactRow {
        subject_id: Some(id),
        subject_type: 2,
        collection_type: 2,
        name_cn: Some(format!("条目 {}", id)),
        score: Some(7.5),
        rank: Some(100),
        collection_total: None,
        created_at: None,
        updated_at: Some("2024-03-01 12:00:00".to_string()),
        eps: Some(12),
        air_date: None,
        all_tags: Some("原创".to_string()),
    }
}

fn record(id: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "properties": {
            "subject_id": {"title": [{"plain_text": title}]}
        }
    })
}

#[tokio::test]
async fn test_publish_creates_page_database_and_records() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_partial_json(json!({"parent": {"type": "workspace"}})))
        .and(header("authorization", "Bearer secret"))
        .and(header("notion-version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "page-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/databases"))
        .and(body_partial_json(json!({"parent": {"page_id": "page-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "db-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_partial_json(json!({"parent": {"database_id": "db-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "row"})))
        .expect(3)
        .mount(&server)
        .await;

    let config = notion_config(&server.uri(), "");
    let report = publish(&config, &fast_retry(), &[fact(1), fact(2), fact(3)])
        .await
        .unwrap();

    assert_eq!(report.parent_page_id, "page-1");
    assert_eq!(report.database_id, "db-1");
    assert_eq!(report.database_url, "https://notion.so/db1");
    assert_eq!(report.success_count, 3);
    assert_eq!(report.error_count, 0);
}

#[tokio::test]
async fn test_publish_skips_existing_records() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/databases/db-9/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [record("p-2", "2")],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "row"})))
        .expect(2)
        .mount(&server)
        .await;

    let config = notion_config(
        &server.uri(),
        "parent-id = \"page-9\"\ndatabase-id = \"db-9\"\nskip-existing = true",
    );
    let report = publish(&config, &fast_retry(), &[fact(1), fact(2), fact(3)])
        .await
        .unwrap();

    assert_eq!(report.existing_records, 1);
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(report.success_count, 2);
}

#[tokio::test]
async fn test_record_failures_do_not_stop_publishing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(400).set_body_string("validation_error"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "row"})))
        .mount(&server)
        .await;

    let config = notion_config(
        &server.uri(),
        "parent-id = \"page-9\"\ndatabase-id = \"db-9\"",
    );
    let report = publish(&config, &fast_retry(), &[fact(1), fact(2), fact(3)])
        .await
        .unwrap();

    assert_eq!(report.error_count, 1);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.existing_records, 0);
}

#[tokio::test]
async fn test_database_creation_failure_aborts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/databases"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "row"})))
        .expect(0)
        .mount(&server)
        .await;

    let config = notion_config(&server.uri(), "parent-id = \"page-9\"");
    let result = publish(&config, &fast_retry(), &[fact(1)]).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_existing_records_follow_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/databases/db-9/query"))
        .and(body_partial_json(json!({"start_cursor": "c2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [record("p-3", "3")],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/databases/db-9/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [record("p-1", "1"), record("p-2", "2")],
            "has_more": true,
            "next_cursor": "c2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = notion_config(&server.uri(), "");
    let client = NotionClient::new(&config, "secret").unwrap();
    let records =
        fetch_existing_records(&client, &query_retry_policy(&fast_retry()), "db-9").await;

    assert_eq!(records.len(), 3);
    assert_eq!(records.get("3").map(String::as_str), Some("p-3"));
}

#[tokio::test]
async fn test_failed_lookup_returns_partial_records() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/databases/db-9/query"))
        .and(body_partial_json(json!({"start_cursor": "c2"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/databases/db-9/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [record("p-1", "1")],
            "has_more": true,
            "next_cursor": "c2"
        })))
        .mount(&server)
        .await;

    let config = notion_config(&server.uri(), "");
    let client = NotionClient::new(&config, "secret").unwrap();
    let records =
        fetch_existing_records(&client, &query_retry_policy(&fast_retry()), "db-9").await;

    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_pipeline_publishes_loaded_rows() {
    let bangumi = MockServer::start().await;
    let notion = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("etl.db");

    let page = json!({
        "total": 2,
        "data": [
            {"subject_id": 1, "type": 2, "subject": {"id": 1, "name_cn": "一"}},
            {"subject_id": 2, "type": 2, "subject": {"id": 2, "name_cn": "二"}}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/v0/users/sai/collections"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(&bangumi)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "row"})))
        .expect(2)
        .mount(&notion)
        .await;

    let config = parse_config(&format!(
        r#"
[source]
base-url = "{}"
username = "sai"
subject-types = [2]
collection-types = [2]

[retry]
base-delay-ms = 5
page-delay-ms = 0
category-delay-ms = 0

[storage]
database-path = "{}"

[notion]
token = "secret"
api-base = "{}"
parent-id = "page-9"
database-id = "db-9"
"#,
        bangumi.uri(),
        db_path.display(),
        notion.uri()
    ))
    .unwrap();

    let summary = run_pipeline(config, "hash".to_string(), RunOptions::default())
        .await
        .unwrap();

    let published = summary.publish.unwrap();
    assert_eq!(published.success_count, 2);
    assert_eq!(published.database_id, "db-9");
}
