//! Category total resolution

use crate::source::{CategoryKey, CategoryStats, CollectionTransport, RetryError, RetryPolicy};
use crate::FetchError;
use std::time::Duration;

/// Queries the expected item count of one category
///
/// Issues a single `limit = 1` request through the retry policy. A failure
/// that survives the policy is logged and returned.
pub async fn check_total<T>(
    transport: &T,
    policy: &RetryPolicy,
    category: CategoryKey,
) -> Result<u64, RetryError<FetchError>>
where
    T: CollectionTransport,
{
    let label = format!("total of {}", category);
    let result = policy
        .run(&label, |_| transport.get_page(category, 1, 0))
        .await;

    match result {
        Ok(page) => Ok(page.total),
        Err(err) => {
            match &err {
                RetryError::Exhausted { attempts, last } => tracing::error!(
                    "Giving up on total of {} after {} attempts: {}",
                    category,
                    attempts,
                    last
                ),
                RetryError::Fatal(e) => {
                    tracing::error!("Total of {} unavailable: {}", category, e)
                }
            }
            Err(err)
        }
    }
}

/// Expected item count of one category, 0 when the check fails
///
/// A failed check degrades to an empty category instead of failing the run.
pub async fn resolve_total<T>(transport: &T, policy: &RetryPolicy, category: CategoryKey) -> u64
where
    T: CollectionTransport,
{
    check_total(transport, policy, category).await.unwrap_or(0)
}

/// Resolves the totals of every category in order
///
/// Sleeps `category_delay` between consecutive checks. A category whose check
/// fails is recorded with a total of 0 and flagged `total_unresolved`; it is
/// not fetched and keeps the run from completing.
pub async fn resolve_all_totals<T>(
    transport: &T,
    policy: &RetryPolicy,
    categories: &[CategoryKey],
    category_delay: Duration,
) -> Vec<CategoryStats>
where
    T: CollectionTransport,
{
    let mut all_stats = Vec::with_capacity(categories.len());

    for (i, &category) in categories.iter().enumerate() {
        if i > 0 && !category_delay.is_zero() {
            tokio::time::sleep(category_delay).await;
        }

        let stats = match check_total(transport, policy, category).await {
            Ok(total) => {
                if total > 0 {
                    tracing::info!("{}: {} items", category, total);
                } else {
                    tracing::debug!("{}: empty", category);
                }
                CategoryStats::new(category, total)
            }
            Err(_) => {
                tracing::warn!("{}: total unresolved, category skipped", category);
                CategoryStats::unresolved(category)
            }
        };
        all_stats.push(stats);
    }

    let grand_total: u64 = all_stats.iter().map(|s| s.expected_total).sum();
    let unresolved = all_stats.iter().filter(|s| s.total_unresolved).count();
    tracing::info!(
        "Resolved {} categories, {} items expected, {} unresolved",
        all_stats.len(),
        grand_total,
        unresolved
    );

    all_stats
}
