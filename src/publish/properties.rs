//! Notion property payloads for fact rows

use crate::model::FactRow;
use serde_json::{json, Map, Number, Value};

/// Notion's limit on a single text content block
pub const TEXT_LIMIT: usize = 2000;

/// Title used for rows without a subject id
pub const UNTITLED: &str = "Untitled";

/// Name of the title property holding the subject id
pub const TITLE_PROPERTY: &str = "subject_id";

/// Property schema of the created database
pub fn database_schema() -> Value {
    json!({
        "subject_id": {"title": {}},
        "subject_type": {"number": {}},
        "collection_type": {"number": {}},
        "name_cn": {"rich_text": {}},
        "score": {"number": {}},
        "rank": {"number": {}},
        "collection_total": {"number": {}},
        "created_at": {"rich_text": {}},
        "updated_at": {"date": {}},
        "eps": {"number": {}},
        "air_date": {"rich_text": {}},
        "all_tags": {"rich_text": {}}
    })
}

fn truncate(text: &str) -> String {
    text.chars().take(TEXT_LIMIT).collect()
}

fn text_block(text: &str) -> Value {
    json!([{"text": {"content": truncate(text)}}])
}

pub fn title(text: &str) -> Value {
    json!({ "title": text_block(text) })
}

pub fn rich_text(text: &str) -> Value {
    json!({ "rich_text": text_block(text) })
}

pub fn number(value: impl Into<Number>) -> Value {
    json!({ "number": Value::Number(value.into()) })
}

/// Date property from a `YYYY-MM-DD HH:MM:SS` or ISO 8601 value
pub fn date(value: &str) -> Value {
    json!({ "date": { "start": value.trim().replacen(' ', "T", 1) } })
}

/// Builds the property map of one fact row
///
/// Null columns are omitted; the title falls back to [`UNTITLED`].
pub fn row_properties(row: &FactRow) -> Map<String, Value> {
    let mut properties = Map::new();

    let id = row.subject_id.map(|id| id.to_string());
    properties.insert(
        TITLE_PROPERTY.to_string(),
        title(id.as_deref().unwrap_or(UNTITLED)),
    );

    properties.insert("subject_type".to_string(), number(row.subject_type));
    properties.insert("collection_type".to_string(), number(row.collection_type));

    let numbers = [
        ("rank", row.rank),
        ("collection_total", row.collection_total),
        ("eps", row.eps),
    ];
    for (name, value) in numbers {
        if let Some(v) = value {
            properties.insert(name.to_string(), number(v));
        }
    }

    if let Some(score) = row.score.and_then(Number::from_f64) {
        properties.insert("score".to_string(), number(score));
    }

    let texts = [
        ("name_cn", &row.name_cn),
        ("created_at", &row.created_at),
        ("air_date", &row.air_date),
        ("all_tags", &row.all_tags),
    ];
    for (name, value) in texts {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            properties.insert(name.to_string(), rich_text(v));
        }
    }

    if let Some(updated) = row.updated_at.as_deref().filter(|v| !v.is_empty()) {
        properties.insert("updated_at".to_string(), date(updated));
    }

    properties
}

/// Reads the plain-text title of a database page returned by a query
pub fn page_title(page: &Value) -> Option<String> {
    let blocks = page
        .get("properties")?
        .get(TITLE_PROPERTY)?
        .get("title")?
        .as_array()?;

    let text: String = blocks
        .iter()
        .filter_map(|b| {
            b.get("plain_text")
                .or_else(|| b.get("text").and_then(|t| t.get("content")))
                .and_then(Value::as_str)
        })
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
