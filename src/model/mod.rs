//! Data model for fetched records and projected rows

mod item;
mod projector;
mod snapshot;

pub use item::{ApiCollectionItem, CollectionItem, CollectionPage, Subject};
pub use projector::{
    extract_top_tags, join_tag_names, normalize_timestamp, parse_infobox, project, AnalyticsRow,
    DataQuality, FactRow, Infobox, Projection, RawRow, TopTag, SUMMARY_MAX_CHARS, TOP_TAG_COUNT,
};
pub use snapshot::{Snapshot, SnapshotRow};
