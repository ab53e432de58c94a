//! Pagination helper for OpenAQ page-number pagination
//!
//! Pages are requested from page 1 with a fixed `limit`. The loop stops when a page is
//! empty or when [`ApiPage::has_more`] reports that `meta.found` has been covered.
//!
//! Includes safety mechanisms:
//! - Maximum page limit to prevent infinite loops
//! - Empty response detection

use crate::fetcher::{FetcherError, FetcherResult};
use crate::ApiPage;
use serde_json::Value;
use std::future::Future;
use tracing::debug;

/// Maximum number of pages fetched for a single resource
pub const MAX_PAGES: u32 = 10_000;

/// Pagination helper for OpenAQ API requests
pub struct PaginationHelper;

impl PaginationHelper {
    /// Fetch every page of a resource
    ///
    /// # Arguments
    /// * `resource` - Description used in logs and errors
    /// * `page_limit` - `limit` sent with every page request
    /// * `fetch_page` - Fetches the raw body of the given 1-based page
    ///
    /// # Returns
    /// Pages in order. A resource with no results yields its single (empty) first page;
    /// an empty trailing page is not kept.
    ///
    /// # Errors
    /// Returns error if a fetch fails, a body has no valid envelope, or [`MAX_PAGES`] is
    /// exceeded
    pub async fn paginate<F, Fut>(
        resource: &str,
        page_limit: u32,
        mut fetch_page: F,
    ) -> FetcherResult<Vec<ApiPage>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = FetcherResult<Value>>,
    {
        let mut pages: Vec<ApiPage> = Vec::new();
        let mut page_number: u32 = 1;

        loop {
            if page_number > MAX_PAGES {
                return Err(FetcherError::ApiError(format!(
                    "Max pages ({MAX_PAGES}) exceeded for {resource} - possible infinite loop"
                )));
            }

            let body = fetch_page(page_number).await?;
            let page = ApiPage::from_body(body).map_err(|e| {
                FetcherError::InvalidResponse(format!("{resource} page {page_number}: {e}"))
            })?;

            if page.result_count() == 0 && !pages.is_empty() {
                debug!(
                    "Empty page {} for {}, pagination complete. Total pages: {}",
                    page_number,
                    resource,
                    pages.len()
                );
                break;
            }

            let more = page.has_more(page_number, page_limit);
            debug!(
                "Fetched page {} for {} with {} results (more: {})",
                page_number,
                resource,
                page.result_count(),
                more
            );
            pages.push(page);

            if !more {
                break;
            }
            page_number += 1;
        }

        Ok(pages)
    }

    /// Decode and concatenate the `results` of every page
    pub fn collect_results<T: serde::de::DeserializeOwned>(
        resource: &str,
        pages: &[ApiPage],
    ) -> FetcherResult<Vec<T>> {
        let mut all = Vec::new();
        for (index, page) in pages.iter().enumerate() {
            let mut items = page.decode_results::<T>().map_err(|e| {
                FetcherError::ParseError(format!("{resource} page {}: {e}", index + 1))
            })?;
            all.append(&mut items);
        }
        Ok(all)
    }
}
