//! Incremental reconciliation and table sync

mod incremental;
mod reconcile;

pub use incremental::{sync_incremental, SyncReport};
pub use reconcile::{plan, reconcile, Keyed, Reconciliation, SyncCounts, SyncPlan};
