//! The deduplicated set of projected rows for one run

use crate::model::projector::{project, AnalyticsRow, DataQuality, FactRow, RawRow};
use crate::model::CollectionItem;
use std::collections::HashSet;

/// Raw and analytics rows of one item
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub raw: RawRow,
    pub analytics: AnalyticsRow,
}

/// All rows projected in a run
///
/// A subject seen twice (e.g. under two categories after a state change
/// mid-run) keeps its first occurrence. Keyless rows are always kept.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    user_id: String,
    rows: Vec<SnapshotRow>,
    seen: HashSet<i64>,
    duplicates: u64,
    keyless: u64,
    quality: DataQuality,
}

impl Snapshot {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Projects and adds one item; returns false when it was a duplicate
    pub fn push(&mut self, item: &CollectionItem) -> bool {
        match item.subject_id {
            Some(id) if !self.seen.insert(id) => {
                self.duplicates += 1;
                tracing::debug!("Duplicate subject {} in {}, keeping first", id, item.category);
                return false;
            }
            Some(_) => {}
            None => self.keyless += 1,
        }

        let projection = project(item, &self.user_id);
        self.quality.merge(projection.quality);
        self.rows.push(SnapshotRow {
            raw: projection.raw,
            analytics: projection.analytics,
        });
        true
    }

    pub fn extend<'a>(&mut self, items: impl IntoIterator<Item = &'a CollectionItem>) {
        for item in items {
            self.push(item);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    pub fn raw_rows(&self) -> impl Iterator<Item = &RawRow> {
        self.rows.iter().map(|r| &r.raw)
    }

    pub fn analytics_rows(&self) -> impl Iterator<Item = &AnalyticsRow> {
        self.rows.iter().map(|r| &r.analytics)
    }

    pub fn fact_rows(&self) -> Vec<FactRow> {
        self.analytics_rows().map(FactRow::from).collect()
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn keyless(&self) -> u64 {
        self.keyless
    }

    pub fn quality(&self) -> DataQuality {
        self.quality
    }
}
