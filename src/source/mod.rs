//! Extraction from the collection API
//!
//! This module handles everything up to the fetched items, including:
//! - Category enumeration and per-category statistics
//! - The retry-with-backoff policy
//! - The HTTP transport and its trait seam
//! - Category total resolution and paged fetching

mod category;
mod fetcher;
mod retry;
mod totals;
mod transport;

pub use category::{
    collection_type_label, subject_type_label, CategoryKey, CategoryStats, COLLECTION_TYPE_CODES,
    SUBJECT_TYPE_CODES,
};
pub use fetcher::{fetch_category, CategoryFetch, FetchSettings};
pub use retry::{RetryError, RetryPolicy};
pub use totals::{check_total, resolve_all_totals, resolve_total};
pub use transport::{build_http_client, collections_endpoint, CollectionTransport, HttpTransport};

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for driving the fetcher without a server

    use super::{CategoryKey, CollectionTransport};
    use crate::model::{ApiCollectionItem, CollectionPage, Subject};
    use crate::FetchError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued responses in order and records every request
    ///
    /// Once the script runs out every request fails with HTTP 404.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<CollectionPage, FetchError>>>,
        calls: Mutex<Vec<(CategoryKey, u32, u64)>>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<Result<CollectionPage, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<(CategoryKey, u32, u64)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn offsets(&self) -> Vec<u64> {
            self.calls().into_iter().map(|(_, _, offset)| offset).collect()
        }
    }

    impl CollectionTransport for ScriptedTransport {
        async fn get_page(
            &self,
            category: CategoryKey,
            limit: u32,
            offset: u64,
        ) -> Result<CollectionPage, FetchError> {
            self.calls.lock().unwrap().push((category, limit, offset));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Status {
                    url: "scripted".to_string(),
                    status: 404,
                }))
        }
    }

    /// A page of `count` items with ids starting at `first_id`
    pub fn page(total: u64, first_id: i64, count: usize) -> CollectionPage {
        CollectionPage {
            total,
            data: (0..count as i64)
                .map(|i| ApiCollectionItem {
                    subject_id: Some(first_id + i),
                    subject: Some(Subject {
                        id: Some(first_id + i),
                        ..Subject::default()
                    }),
                    ..ApiCollectionItem::default()
                })
                .collect(),
        }
    }

    pub fn timeout() -> FetchError {
        FetchError::Timeout {
            url: "scripted".to_string(),
        }
    }

    pub fn rate_limited() -> FetchError {
        FetchError::RateLimited {
            url: "scripted".to_string(),
        }
    }

    pub fn server_error(status: u16) -> FetchError {
        FetchError::Status {
            url: "scripted".to_string(),
            status,
        }
    }
}
