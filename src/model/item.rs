//! Collection records as returned by the API and as handed to the projector

use crate::source::CategoryKey;
use serde::Deserialize;
use serde_json::Value;

/// One page of `GET /v0/users/{user}/collections`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub data: Vec<ApiCollectionItem>,
}

/// Wire shape of one collection entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiCollectionItem {
    #[serde(default)]
    pub subject_id: Option<i64>,
    #[serde(default)]
    pub subject_type: Option<u8>,
    #[serde(rename = "type", default)]
    pub collection_type: Option<u8>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub ep_status: Option<i64>,
    #[serde(default)]
    pub vol_status: Option<i64>,
    #[serde(default)]
    pub subject: Option<Subject>,
}

/// Nested subject payload
///
/// `infobox` and `tags` stay untyped so a malformed entry degrades to nulls
/// in the projector instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_cn: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub collection_total: Option<i64>,
    #[serde(default)]
    pub eps: Option<i64>,
    #[serde(default)]
    pub volumes: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "type", default)]
    pub subject_type: Option<i64>,
    #[serde(default)]
    pub short_summary: Option<String>,
    #[serde(default)]
    pub infobox: Option<Value>,
    #[serde(default)]
    pub tags: Option<Value>,
}

/// A fetched record tagged with the category it was fetched under
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionItem {
    pub category: CategoryKey,
    /// Stable identifying key; `None` for the data-quality tail
    pub subject_id: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub ep_status: Option<i64>,
    pub vol_status: Option<i64>,
    pub subject: Subject,
}

impl CollectionItem {
    /// Builds the domain record; the subject's own id wins over the entry's
    pub fn from_api(category: CategoryKey, item: ApiCollectionItem) -> Self {
        let subject = item.subject.unwrap_or_default();
        let subject_id = subject.id.or(item.subject_id);

        Self {
            category,
            subject_id,
            created_at: item.created_at,
            updated_at: item.updated_at,
            ep_status: item.ep_status,
            vol_status: item.vol_status,
            subject,
        }
    }
}
