//! Set-based reconciliation of a fresh snapshot against the previous target
//!
//! Given the source rows of this run and the rows persisted by the previous
//! run, computes the new target contents:
//!
//! 1. previous target rows whose key is absent from the source are deleted
//! 2. source rows with new keys are inserted
//! 3. source rows with keys already in the target overwrite those rows
//! 4. keyless source rows are appended; keyless target rows are dropped
//!
//! Key sets are [`BTreeSet`]s so every plan is deterministic.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// A row with an optional identifying key
pub trait Keyed {
    type Key: Ord + Clone + Debug;

    fn key(&self) -> Option<Self::Key>;
}

/// Key sets derived from source and previous target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan<K: Ord> {
    /// Keys only in the source
    pub inserts: BTreeSet<K>,
    /// Keys only in the previous target
    pub deletes: BTreeSet<K>,
    /// Keys in both; the source row wins
    pub updates: BTreeSet<K>,
}

impl<K: Ord> SyncPlan<K> {
    pub fn insert_count(&self) -> usize {
        self.inserts.len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Inserts minus deletes
    pub fn net_change(&self) -> i64 {
        self.inserts.len() as i64 - self.deletes.len() as i64
    }

    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Counts reported for one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub inserts: usize,
    pub deletes: usize,
    pub updates: usize,
    pub net_change: i64,
    pub source_keyless: usize,
    pub target_keyless_dropped: usize,
    pub initial_load: bool,
}

/// New target contents plus the plan that produced them
#[derive(Debug, Clone)]
pub struct Reconciliation<R: Keyed> {
    pub rows: Vec<R>,
    pub plan: SyncPlan<R::Key>,
    pub source_keyless: usize,
    pub target_keyless_dropped: usize,
    /// The previous target was empty and the source was taken as is
    pub initial_load: bool,
}

impl<R: Keyed> Reconciliation<R> {
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            inserts: self.plan.insert_count(),
            deletes: self.plan.delete_count(),
            updates: self.plan.update_count(),
            net_change: self.plan.net_change(),
            source_keyless: self.source_keyless,
            target_keyless_dropped: self.target_keyless_dropped,
            initial_load: self.initial_load,
        }
    }
}

fn key_set<R: Keyed>(rows: &[R]) -> BTreeSet<R::Key> {
    rows.iter().filter_map(Keyed::key).collect()
}

/// Computes the key-set plan without materializing rows
pub fn plan<R: Keyed>(source: &[R], target: &[R]) -> SyncPlan<R::Key> {
    let source_keys = key_set(source);
    let target_keys = key_set(target);

    SyncPlan {
        inserts: source_keys.difference(&target_keys).cloned().collect(),
        deletes: target_keys.difference(&source_keys).cloned().collect(),
        updates: source_keys.intersection(&target_keys).cloned().collect(),
    }
}

/// Reconciles `source` against `previous_target`
///
/// Pure: neither input is modified and the same inputs always give the same
/// output. Keyed rows are assumed unique per side.
pub fn reconcile<R>(source: &[R], previous_target: &[R]) -> Reconciliation<R>
where
    R: Keyed + Clone,
{
    let source_keyless = source.iter().filter(|r| r.key().is_none()).count();

    if previous_target.is_empty() {
        let inserts = key_set(source);
        return Reconciliation {
            rows: source.to_vec(),
            plan: SyncPlan {
                inserts,
                deletes: BTreeSet::new(),
                updates: BTreeSet::new(),
            },
            source_keyless,
            target_keyless_dropped: 0,
            initial_load: true,
        };
    }

    let plan = plan(source, previous_target);
    let target_keyless_dropped = previous_target
        .iter()
        .filter(|r| r.key().is_none())
        .count();

    let mut rows = Vec::with_capacity(source.len());

    // Target rows untouched by this run
    rows.extend(previous_target.iter().filter(|r| match r.key() {
        Some(k) => !plan.deletes.contains(&k) && !plan.updates.contains(&k),
        None => false,
    }));
    rows.extend(
        source
            .iter()
            .filter(|r| matches!(r.key(), Some(k) if plan.inserts.contains(&k))),
    );
    rows.extend(
        source
            .iter()
            .filter(|r| matches!(r.key(), Some(k) if plan.updates.contains(&k))),
    );
    rows.extend(source.iter().filter(|r| r.key().is_none()));

    Reconciliation {
        rows: rows.into_iter().cloned().collect(),
        plan,
        source_keyless,
        target_keyless_dropped,
        initial_load: false,
    }
}
