//! Paged collection fetcher
//!
//! Pages through one category at a time, strictly sequentially. Every loop
//! iteration either advances the offset or takes a bounded rate-limit
//! cooldown, so a category issues at most `ceil(total / page_size)`
//! successful requests plus bounded retries.

use crate::config::{RetryConfig, SourceConfig};
use crate::model::{CollectionItem, CollectionPage};
use crate::source::{CategoryKey, CategoryStats, CollectionTransport, RetryError, RetryPolicy};
use crate::FetchError;
use std::time::Duration;

/// Pacing and failure thresholds for the fetch loop
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub page_size: u32,
    /// Applied to connection and timeout failures of a single page
    pub retry: RetryPolicy,
    pub rate_limit_cooldown: Duration,
    pub max_rate_limit_waits: u32,
    pub max_consecutive_failures: u32,
    pub page_delay: Duration,
}

impl FetchSettings {
    pub fn from_config(source: &SourceConfig, retry: &RetryConfig) -> Self {
        Self {
            page_size: source.page_size,
            retry: RetryPolicy::from_config(retry),
            rate_limit_cooldown: Duration::from_millis(retry.rate_limit_cooldown_ms),
            max_rate_limit_waits: retry.max_rate_limit_waits,
            max_consecutive_failures: retry.max_consecutive_failures.max(1),
            page_delay: Duration::from_millis(retry.page_delay_ms),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            retry: RetryPolicy::transient(3, Duration::from_secs(1)),
            rate_limit_cooldown: Duration::from_secs(10),
            max_rate_limit_waits: 10,
            max_consecutive_failures: 3,
            page_delay: Duration::from_millis(500),
        }
    }
}

/// Items of one category and the statistics of fetching them
#[derive(Debug, Clone)]
pub struct CategoryFetch {
    pub items: Vec<CollectionItem>,
    pub stats: CategoryStats,
}

/// Fetches every page of `category`
///
/// Failed pages are skipped and counted; the fetch only stops early once
/// `max_consecutive_failures` pages in a row have failed, returning what was
/// accumulated so far.
pub async fn fetch_category<T>(
    transport: &T,
    settings: &FetchSettings,
    category: CategoryKey,
    expected_total: u64,
) -> CategoryFetch
where
    T: CollectionTransport,
{
    let mut stats = CategoryStats::new(category, expected_total);
    let mut items = Vec::new();

    if expected_total == 0 {
        return CategoryFetch { items, stats };
    }

    let page_size = u64::from(settings.page_size.max(1));
    let mut offset = 0u64;

    loop {
        match fetch_page(transport, settings, category, offset, &mut stats).await {
            Ok(page) => {
                if page.data.is_empty() {
                    tracing::debug!("{}: empty page at offset {}, done", category, offset);
                    break;
                }

                let count = page.data.len();
                items.extend(
                    page.data
                        .into_iter()
                        .map(|item| CollectionItem::from_api(category, item)),
                );
                stats.fetched_items += count as u64;
                stats.pages_fetched += 1;
                stats.consecutive_failures = 0;

                tracing::debug!(
                    "{}: page {} at offset {}, {} items ({}/{})",
                    category,
                    stats.pages_fetched,
                    offset,
                    count,
                    stats.fetched_items,
                    expected_total
                );

                if offset + page_size >= expected_total {
                    break;
                }

                offset += page_size;
                if !settings.page_delay.is_zero() {
                    tokio::time::sleep(settings.page_delay).await;
                }
            }
            Err(e) => {
                stats.pages_failed += 1;
                stats.consecutive_failures += 1;
                tracing::error!("{}: page at offset {} failed: {}", category, offset, e);

                if stats.consecutive_failures >= settings.max_consecutive_failures {
                    stats.aborted = true;
                    tracing::warn!(
                        "{}: {} consecutive failed pages, aborting with {} items",
                        category,
                        stats.consecutive_failures,
                        stats.fetched_items
                    );
                    break;
                }

                tracing::warn!("{}: skipping page at offset {}", category, offset);
                offset += page_size;
                if offset >= expected_total {
                    break;
                }
            }
        }
    }

    if stats.is_complete() {
        tracing::info!(
            "{}: {} items from {} pages",
            category,
            stats.fetched_items,
            stats.pages_fetched
        );
    } else {
        tracing::warn!(
            "{}: incomplete, {}/{} items ({:.1}%), {} pages failed",
            category,
            stats.fetched_items,
            expected_total,
            stats.completion_percent(),
            stats.pages_failed
        );
    }

    CategoryFetch { items, stats }
}

/// Requests one page, absorbing rate-limit cooldowns
///
/// Each cooldown restarts the transient retry budget for the page.
async fn fetch_page<T>(
    transport: &T,
    settings: &FetchSettings,
    category: CategoryKey,
    offset: u64,
    stats: &mut CategoryStats,
) -> Result<CollectionPage, RetryError<FetchError>>
where
    T: CollectionTransport,
{
    let label = format!("{} offset {}", category, offset);
    let mut waits = 0;

    loop {
        let result = settings
            .retry
            .run(&label, |_| {
                transport.get_page(category, settings.page_size, offset)
            })
            .await;

        match result {
            Err(RetryError::Fatal(e)) if e.is_rate_limited() => {
                if waits >= settings.max_rate_limit_waits {
                    tracing::error!(
                        "{}: still rate limited after {} cooldowns",
                        label,
                        waits
                    );
                    return Err(RetryError::Fatal(e));
                }

                waits += 1;
                stats.rate_limit_waits += 1;
                tracing::warn!(
                    "{}: rate limited, cooling down for {:.0}s",
                    label,
                    settings.rate_limit_cooldown.as_secs_f64()
                );
                tokio::time::sleep(settings.rate_limit_cooldown).await;
            }
            other => return other,
        }
    }
}
