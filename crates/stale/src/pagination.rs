//! Lazy, restartable page sequences over paginated tracker listings.

use futures::stream::{self, Stream, StreamExt};
use std::future::Future;
use tracing::warn;
use tracker::TrackerError;

/// Upper bound on pages fetched from one listing.
pub const MAX_PAGES: u32 = 100;

/// A paginated listing, fetched one 1-based page at a time until an empty
/// page comes back.
///
/// Nothing is fetched until [`Paginated::stream`] is polled, and every call
/// to `stream` starts again from page 1.
pub struct Paginated<F> {
    fetch: F,
    max_pages: u32,
}

impl<F, Fut, T> Paginated<F>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, TrackerError>>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            max_pages: MAX_PAGES,
        }
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Stream of non-empty pages. Ends after the first empty page, the first
    /// error, or `max_pages` pages.
    pub fn stream<'a>(&'a self) -> impl Stream<Item = Result<Vec<T>, TrackerError>> + 'a
    where
        Fut: 'a,
        T: 'a,
    {
        stream::unfold(Some(1_u32), move |next| async move {
            let page = next?;
            if page > self.max_pages {
                warn!(max_pages = self.max_pages, "Pagination cap reached, truncating listing");
                return None;
            }
            match (self.fetch)(page).await {
                Ok(items) if items.is_empty() => None,
                Ok(items) => Some((Ok(items), Some(page + 1))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Fetch every page and concatenate the results.
    pub async fn drain<'a>(&'a self) -> Result<Vec<T>, TrackerError>
    where
        Fut: 'a,
        T: 'a,
    {
        let mut pages = std::pin::pin!(self.stream());
        let mut all = Vec::new();
        while let Some(page) = pages.next().await {
            all.extend(page?);
        }
        Ok(all)
    }
}
