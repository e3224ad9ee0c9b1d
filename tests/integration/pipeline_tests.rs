//! Integration tests for the full pipeline
//!
//! These tests run fetch, load and incremental sync end-to-end against a
//! wiremock collection API and a SQLite file in a temporary directory.

use bangumi_etl::config::{parse_config, Config};
use bangumi_etl::output::{
    generate_markdown_report, load_latest_statistics, write_json_summary,
};
use bangumi_etl::pipeline::{run_pipeline, RunOptions};
use bangumi_etl::storage::{open_storage, RunStatus, Storage};
use serde_json::{json, Value};
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COLLECTIONS: &str = "/v0/users/sai/collections";

fn create_test_config(base_url: &str, db_path: &Path) -> Config {
    parse_config(&format!(
        r#"
[source]
base-url = "{}"
username = "sai"
subject-types = [2]
collection-types = [2, 3]
page-size = 2

[retry]
max-attempts = 2
base-delay-ms = 5
rate-limit-cooldown-ms = 10
page-delay-ms = 0
category-delay-ms = 0

[storage]
database-path = "{}"
table-name = "view_logs"
"#,
        base_url,
        db_path.display()
    ))
    .unwrap()
}

fn page_body(total: u64, ids: &[i64]) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "subject_id": id,
                "type": 2,
                "updated_at": "2024-03-01T12:00:00+08:00",
                "subject": {
                    "id": id,
                    "name": format!("subject {}", id),
                    "name_cn": format!("条目 {}", id),
                    "type": 2,
                    "date": "2023-10-01",
                    "infobox": [{"key": "导演", "value": "someone"}],
                    "tags": [{"name": "原创", "count": 10}, {"name": "2023", "count": 4}]
                }
            })
        })
        .collect();
    json!({ "total": total, "data": data })
}

/// Serves `ids` under 动画/看过 and nothing under 动画/在看
async fn mount_collection(server: &MockServer, ids: &[i64]) {
    let total = ids.len() as u64;

    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .and(query_param("type", "2"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(total, &ids[..1])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .and(query_param("type", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, &[])))
        .mount(server)
        .await;

    for (index, chunk) in ids.chunks(2).enumerate() {
        Mock::given(method("GET"))
            .and(path(COLLECTIONS))
            .and(query_param("type", "2"))
            .and(query_param("limit", "2"))
            .and(query_param("offset", (index * 2).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(total, chunk)))
            .mount(server)
            .await;
    }
}

fn no_publish() -> RunOptions {
    RunOptions { publish: false }
}

#[tokio::test]
async fn test_first_run_loads_all_tables() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("etl.db");
    mount_collection(&server, &[1, 2, 3]).await;

    let summary = run_pipeline(
        create_test_config(&server.uri(), &db_path),
        "hash-1".to_string(),
        no_publish(),
    )
    .await
    .unwrap();

    assert_eq!(summary.status, "completed");
    assert_eq!(summary.totals.expected_items, 3);
    assert_eq!(summary.totals.fetched_items, 3);
    assert_eq!(summary.load.as_ref().unwrap().rows_loaded, 3);
    assert!(summary.sync.as_ref().unwrap().counts.initial_load);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(storage.count_rows("view_logs_raw").unwrap(), 3);
    assert_eq!(storage.count_rows("view_logs_incremental").unwrap(), 3);

    let facts = storage.read_fact_rows("view_logs").unwrap();
    assert_eq!(facts[0].subject_id, Some(1));
    assert_eq!(facts[0].name_cn.as_deref(), Some("条目 1"));
    assert_eq!(facts[0].all_tags.as_deref(), Some("原创, 2023"));

    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash-1");
}

#[tokio::test]
async fn test_second_run_converges_incremental_table() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("etl.db");

    mount_collection(&server, &[1, 2, 3]).await;
    run_pipeline(
        create_test_config(&server.uri(), &db_path),
        "hash".to_string(),
        no_publish(),
    )
    .await
    .unwrap();

    server.reset().await;
    mount_collection(&server, &[1, 3, 4]).await;
    let summary = run_pipeline(
        create_test_config(&server.uri(), &db_path),
        "hash".to_string(),
        no_publish(),
    )
    .await
    .unwrap();

    let sync = summary.sync.unwrap();
    assert!(!sync.counts.initial_load);
    assert_eq!(sync.counts.inserts, 1);
    assert_eq!(sync.counts.deletes, 1);
    assert_eq!(sync.counts.updates, 2);
    assert_eq!(sync.counts.net_change, 0);
    assert_eq!(sync.previous_rows, 3);

    let storage = open_storage(&db_path).unwrap();
    let mut ids: Vec<_> = storage
        .read_fact_rows("view_logs_incremental")
        .unwrap()
        .iter()
        .map(|row| row.subject_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![Some(1), Some(3), Some(4)]);

    let latest = load_latest_statistics(&storage).unwrap().unwrap();
    assert_eq!(latest.run.id, summary.run_id);
    assert_eq!(latest.categories.len(), 2);
}

#[tokio::test]
async fn test_unreachable_totals_leave_tables_untouched() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("etl.db");

    mount_collection(&server, &[1, 2]).await;
    run_pipeline(
        create_test_config(&server.uri(), &db_path),
        "hash".to_string(),
        no_publish(),
    )
    .await
    .unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let summary = run_pipeline(
        create_test_config(&server.uri(), &db_path),
        "hash".to_string(),
        no_publish(),
    )
    .await
    .unwrap();

    assert_eq!(summary.status, "failed");
    assert!(summary.load.is_none());

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(storage.count_rows("view_logs").unwrap(), 2);
    assert_eq!(storage.count_rows("view_logs_incremental").unwrap(), 2);
    assert_eq!(
        storage.get_run(summary.run_id).unwrap().status,
        RunStatus::Failed
    );
}

#[tokio::test]
async fn test_summary_and_report_files() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("etl.db");
    mount_collection(&server, &[1, 2, 3]).await;

    let summary = run_pipeline(
        create_test_config(&server.uri(), &db_path),
        "hash".to_string(),
        no_publish(),
    )
    .await
    .unwrap();

    let json_path = dir.path().join("run_summary.json");
    let report_path = dir.path().join("report.md");
    write_json_summary(&summary, &json_path).unwrap();
    generate_markdown_report(&summary, &report_path).unwrap();

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(written["username"], "sai");
    assert_eq!(written["load"]["rows_loaded"], 3);
    assert_eq!(written["sync"]["initial_load"], true);

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("# Bangumi Collection Run: sai"));
    assert!(report.contains("| 动画 - 看过 | 3 | 3 | 100.0% | 2 | 0 | no |"));
}

#[tokio::test]
async fn test_export_dir_receives_csv_files() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("etl.db");
    let export_dir = dir.path().join("export");
    mount_collection(&server, &[1, 2, 3]).await;

    let mut config = create_test_config(&server.uri(), &db_path);
    config.output.export_dir = Some(export_dir.display().to_string());
    let summary = run_pipeline(config, "hash".to_string(), no_publish())
        .await
        .unwrap();

    let export = summary.export.unwrap();
    assert_eq!(export.rows, 3);
    assert_eq!(export.files.len(), 3);

    let analytics =
        std::fs::read_to_string(export_dir.join("bangumi_analytics_by_category.csv")).unwrap();
    let mut lines = analytics.trim_start_matches('\u{feff}').lines();
    let header = lines.next().unwrap();
    assert!(header.contains("director"));
    assert!(header.contains("tag_5_count"));
    assert_eq!(lines.count(), 3);

    let categories =
        std::fs::read_to_string(export_dir.join("bangumi_category_summary.csv")).unwrap();
    assert!(categories.contains("动画,看过,3,3,2,0,100.0"));
    assert!(categories.contains("动画,在看,0,0,0,0,0.0"));
}

#[tokio::test]
async fn test_no_export_without_export_dir() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("etl.db");
    mount_collection(&server, &[1]).await;

    let summary = run_pipeline(
        create_test_config(&server.uri(), &db_path),
        "hash".to_string(),
        no_publish(),
    )
    .await
    .unwrap();

    assert!(summary.export.is_none());
}
