//! Row projection
//!
//! Maps one fetched [`CollectionItem`] to the rows loaded downstream:
//! - [`RawRow`]: the record as fetched, with tags and infobox kept as JSON text
//! - [`AnalyticsRow`]: derived columns (infobox lookups, top tags, tag list)
//! - [`FactRow`]: the analytics row without the credit and top-tag columns,
//!   which is what the fact and incremental tables hold
//!
//! Malformed nested attributes never fail a row. They become nulls and are
//! counted in [`DataQuality`].

use crate::model::CollectionItem;
use crate::sync::Keyed;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

/// Number of tag columns carried by an analytics row
pub const TOP_TAG_COUNT: usize = 5;

/// Character limit applied to `short_summary`
pub const SUMMARY_MAX_CHARS: usize = 500;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DIRECTOR_KEYS: [&str; 2] = ["导演", "監督"];
const STUDIO_KEYS: [&str; 2] = ["动画制作", "アニメーション制作"];
const COUNTRY_KEYS: [&str; 2] = ["国家/地区", "国"];
const PUBLISHER_KEYS: [&str; 2] = ["出版社", "発売元"];
const AUTHOR_KEYS: [&str; 2] = ["作者", "著者"];

/// The record as fetched, flattened
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRow {
    pub user_id: String,
    pub subject_id: Option<i64>,
    pub subject_type: u8,
    pub collection_type: u8,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub ep_status: Option<i64>,
    pub vol_status: Option<i64>,
    pub name: Option<String>,
    pub name_cn: Option<String>,
    pub score: Option<f64>,
    pub rank: Option<i64>,
    pub collection_total: Option<i64>,
    pub eps: Option<i64>,
    pub volumes: Option<i64>,
    pub date: Option<String>,
    /// Subject type as reported inside the subject payload
    pub subject_kind: Option<i64>,
    pub short_summary: Option<String>,
    /// JSON list of tag names
    pub tags: Option<String>,
    pub tags_raw: Option<String>,
    /// JSON object of the parsed infobox
    pub infobox_raw: Option<String>,
}

/// One of the top tags of a subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopTag {
    pub name: Option<String>,
    pub count: Option<i64>,
}

/// Derived analytics columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsRow {
    pub subject_id: Option<i64>,
    pub subject_type: u8,
    pub collection_type: u8,
    pub name_cn: Option<String>,
    pub score: Option<f64>,
    pub rank: Option<i64>,
    pub collection_total: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub eps: Option<i64>,
    pub air_date: Option<String>,
    pub director: Option<String>,
    pub studio: Option<String>,
    pub country: Option<String>,
    pub publisher: Option<String>,
    pub author: Option<String>,
    /// Always [`TOP_TAG_COUNT`] entries
    pub top_tags: Vec<TopTag>,
    pub all_tags: Option<String>,
}

/// The loaded fact record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRow {
    pub subject_id: Option<i64>,
    pub subject_type: u8,
    pub collection_type: u8,
    pub name_cn: Option<String>,
    pub score: Option<f64>,
    pub rank: Option<i64>,
    pub collection_total: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub eps: Option<i64>,
    pub air_date: Option<String>,
    pub all_tags: Option<String>,
}

impl From<&AnalyticsRow> for FactRow {
    fn from(row: &AnalyticsRow) -> Self {
        Self {
            subject_id: row.subject_id,
            subject_type: row.subject_type,
            collection_type: row.collection_type,
            name_cn: row.name_cn.clone(),
            score: row.score,
            rank: row.rank,
            collection_total: row.collection_total,
            created_at: row.created_at.clone(),
            updated_at: row.updated_at.clone(),
            eps: row.eps,
            air_date: row.air_date.clone(),
            all_tags: row.all_tags.clone(),
        }
    }
}

impl Keyed for FactRow {
    type Key = i64;

    fn key(&self) -> Option<i64> {
        self.subject_id
    }
}

/// Data-quality events observed while projecting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    pub missing_subject_id: u64,
    pub malformed_infobox: u64,
    pub malformed_tags: u64,
    pub unparseable_timestamps: u64,
}

impl DataQuality {
    pub fn merge(&mut self, other: DataQuality) {
        self.missing_subject_id += other.missing_subject_id;
        self.malformed_infobox += other.malformed_infobox;
        self.malformed_tags += other.malformed_tags;
        self.unparseable_timestamps += other.unparseable_timestamps;
    }

    pub fn total(&self) -> u64 {
        self.missing_subject_id
            + self.malformed_infobox
            + self.malformed_tags
            + self.unparseable_timestamps
    }
}

/// Result of projecting one item
#[derive(Debug, Clone)]
pub struct Projection {
    pub raw: RawRow,
    pub analytics: AnalyticsRow,
    pub quality: DataQuality,
}

/// Parsed infobox entries in source order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Infobox {
    entries: Vec<(String, String)>,
}

impl Infobox {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First present value among locale variants of one field
    pub fn lookup(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.get(k)).map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON object text, `None` when empty
    pub fn to_json(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Some(Value::Object(map).to_string())
    }
}

/// Parses the `infobox` list of `{key, value}` entries
///
/// The second element of the result counts entries that were not objects.
pub fn parse_infobox(infobox: Option<&Value>) -> (Infobox, u64) {
    let mut parsed = Infobox::default();
    let mut malformed = 0;

    let entries = match infobox {
        None | Some(Value::Null) => return (parsed, 0),
        Some(Value::Array(entries)) => entries,
        Some(_) => return (parsed, 1),
    };

    for entry in entries {
        let Some(object) = entry.as_object() else {
            malformed += 1;
            continue;
        };

        let key = object
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim();
        if key.is_empty() {
            continue;
        }

        let value = match object.get("value") {
            None | Some(Value::Null) => None,
            Some(Value::Array(values)) => {
                let joined = values
                    .iter()
                    .map(|v| match v {
                        Value::Object(_) => dict_value(v),
                        other => scalar_text(other),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(joined)
            }
            Some(v @ Value::Object(_)) => Some(dict_value(v)),
            Some(other) => Some(scalar_text(other).trim().to_string()),
        };

        if let Some(value) = value.filter(|v| !v.is_empty()) {
            parsed.entries.push((key.to_string(), value));
        }
    }

    (parsed, malformed)
}

/// `v` field of an infobox dict value, else its JSON text
fn dict_value(value: &Value) -> String {
    match value.get("v") {
        Some(v) => scalar_text(v),
        None => value.to_string(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// First `top_n` tags as name/count pairs, padded with empty entries
///
/// Non-object entries yield an empty pair.
pub fn extract_top_tags(tags: &[Value], top_n: usize) -> Vec<TopTag> {
    (0..top_n)
        .map(|i| match tags.get(i).and_then(Value::as_object) {
            Some(tag) => TopTag {
                name: tag.get("name").and_then(Value::as_str).map(str::to_string),
                count: tag.get("count").and_then(Value::as_i64),
            },
            None => TopTag::default(),
        })
        .collect()
}

/// Tag names joined with `", "`, `None` when there are none
pub fn join_tag_names(tags: &[Value]) -> Option<String> {
    let names: Vec<&str> = tags
        .iter()
        .filter_map(|t| t.get("name").and_then(Value::as_str))
        .filter(|n| !n.is_empty())
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

/// Renders a timestamp as `YYYY-MM-DD HH:MM:SS`, dropping any offset
///
/// The wall-clock time of the original offset is kept. Naive datetimes and
/// plain dates are accepted as well.
///
/// # Example
///
/// ```
/// use bangumi_etl::model::normalize_timestamp;
///
/// assert_eq!(
///     normalize_timestamp("2024-03-01T10:00:00+08:00").as_deref(),
///     Some("2024-03-01 10:00:00")
/// );
/// assert_eq!(normalize_timestamp("yesterday"), None);
/// ```
pub fn normalize_timestamp(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local().format(TIMESTAMP_FORMAT).to_string());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.format(TIMESTAMP_FORMAT).to_string());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Projects one collection item into its raw and analytics rows
pub fn project(item: &CollectionItem, user_id: &str) -> Projection {
    let subject = &item.subject;
    let mut quality = DataQuality::default();

    if item.subject_id.is_none() {
        quality.missing_subject_id += 1;
    }

    let (infobox, malformed_infobox) = parse_infobox(subject.infobox.as_ref());
    quality.malformed_infobox += malformed_infobox;

    let tags: &[Value] = match &subject.tags {
        None | Some(Value::Null) => &[],
        Some(Value::Array(tags)) => tags,
        Some(_) => {
            quality.malformed_tags += 1;
            &[]
        }
    };

    let mut timestamp = |raw: &Option<String>| -> Option<String> {
        let raw = raw.as_deref()?;
        let normalized = normalize_timestamp(raw);
        if normalized.is_none() {
            quality.unparseable_timestamps += 1;
        }
        normalized
    };
    let created_at = timestamp(&item.created_at);
    let updated_at = timestamp(&item.updated_at);

    let tag_names: Vec<Option<String>> = tags
        .iter()
        .filter(|t| t.is_object())
        .map(|t| t.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();

    let raw = RawRow {
        user_id: user_id.to_string(),
        subject_id: item.subject_id,
        subject_type: item.category.subject_type,
        collection_type: item.category.collection_type,
        created_at: created_at.clone(),
        updated_at: updated_at.clone(),
        ep_status: item.ep_status,
        vol_status: item.vol_status,
        name: subject.name.clone(),
        name_cn: subject.name_cn.clone(),
        score: subject.score,
        rank: subject.rank,
        collection_total: subject.collection_total,
        eps: subject.eps,
        volumes: subject.volumes,
        date: subject.date.clone(),
        subject_kind: subject.subject_type,
        short_summary: Some(truncate_chars(
            subject.short_summary.as_deref().unwrap_or_default(),
            SUMMARY_MAX_CHARS,
        )),
        tags: serde_json::to_string(&tag_names).ok(),
        tags_raw: if tags.is_empty() {
            None
        } else {
            Some(Value::Array(tags.to_vec()).to_string())
        },
        infobox_raw: infobox.to_json(),
    };

    let name_cn = subject
        .name_cn
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| subject.name.clone());

    let analytics = AnalyticsRow {
        subject_id: item.subject_id,
        subject_type: item.category.subject_type,
        collection_type: item.category.collection_type,
        name_cn,
        score: subject.score,
        rank: subject.rank,
        collection_total: subject.collection_total,
        created_at,
        updated_at,
        eps: subject.eps,
        air_date: subject.date.clone(),
        director: infobox.lookup(&DIRECTOR_KEYS),
        studio: infobox.lookup(&STUDIO_KEYS),
        country: infobox.lookup(&COUNTRY_KEYS),
        publisher: infobox.lookup(&PUBLISHER_KEYS),
        author: infobox.lookup(&AUTHOR_KEYS),
        top_tags: extract_top_tags(tags, TOP_TAG_COUNT),
        all_tags: join_tag_names(tags),
    };

    Projection {
        raw,
        analytics,
        quality,
    }
}
