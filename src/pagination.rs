//! Lazy, cursor-driven pagination over a remote listing.
//!
//! A [`PagedSequence`] holds at most one page of items. The next page is fetched only
//! when the consumer asks for an item past the end of the current one, using
//! continuation arguments derived from the current page's pagination link.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter::FusedIterator;
use tracing::debug;

/// Request arguments for fetching one page
pub type ContinuationArgs = BTreeMap<String, String>;

/// Link to the next page, as returned by the remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationLink {
    pub url: String,
}

impl PaginationLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Continuation arguments carried by the link's query string.
    ///
    /// `title` becomes `page`; every other key has `topiclist_` replaced by `vtl`.
    /// Values are form-decoded, so a literal `+` reads as a space and `%2B` as `+`.
    pub fn continuation_args(&self) -> Result<ContinuationArgs, FetchError> {
        let (_, query) = self
            .url
            .split_once('?')
            .ok_or_else(|| FetchError::Pagination(format!("no query string in '{}'", self.url)))?;
        let query = query.split('#').next().unwrap_or_default();

        let args = url::form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| {
                let key = if key == "title" {
                    "page".to_string()
                } else {
                    key.replace("topiclist_", "vtl")
                };
                (key, value.into_owned())
            })
            .collect();
        Ok(args)
    }
}

/// One fetched page: its root items and the link to the next page, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub roots: Vec<T>,
    pub pagination: Option<PaginationLink>,
}

impl<T> Page<T> {
    pub fn new(roots: Vec<T>, pagination: Option<PaginationLink>) -> Self {
        Self { roots, pagination }
    }

    /// A page with no items, which ends a sequence
    pub fn empty() -> Self {
        Self {
            roots: Vec::new(),
            pagination: None,
        }
    }
}

/// Fetches one page for a set of continuation arguments
pub trait PageFetcher {
    type Item;

    fn fetch(&mut self, args: &ContinuationArgs) -> Result<Page<Self::Item>, FetchError>;
}

impl<T, F> PageFetcher for F
where
    F: FnMut(&ContinuationArgs) -> Result<Page<T>, FetchError>,
{
    type Item = T;

    fn fetch(&mut self, args: &ContinuationArgs) -> Result<Page<T>, FetchError> {
        self(args)
    }
}

enum Cursor<T> {
    /// Nothing fetched yet
    Start(ContinuationArgs),
    Page {
        items: std::vec::IntoIter<T>,
        next: Option<PaginationLink>,
    },
    Done,
}

/// Lazy, non-restartable sequence over a paginated listing.
///
/// Yields each page's roots in order. Ends at the first empty page, after a page
/// with no pagination link, or after yielding a fetch error.
pub struct PagedSequence<F: PageFetcher> {
    fetcher: F,
    cursor: Cursor<F::Item>,
    pages_fetched: usize,
}

impl<F: PageFetcher> PagedSequence<F> {
    /// Create the sequence. Nothing is fetched until the first item is requested.
    pub fn new(fetcher: F, initial_args: ContinuationArgs) -> Self {
        Self {
            fetcher,
            cursor: Cursor::Start(initial_args),
            pages_fetched: 0,
        }
    }

    /// Number of pages fetched so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn load(&mut self, args: &ContinuationArgs) -> Result<(), FetchError> {
        let page = self.fetcher.fetch(args)?;
        self.pages_fetched += 1;
        debug!(
            page = self.pages_fetched,
            items = page.roots.len(),
            has_next = page.pagination.is_some(),
            "Fetched page"
        );
        if !page.roots.is_empty() {
            self.cursor = Cursor::Page {
                items: page.roots.into_iter(),
                next: page.pagination,
            };
        }
        Ok(())
    }
}

impl<F: PageFetcher> Iterator for PagedSequence<F> {
    type Item = Result<F::Item, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // The cursor stays Done unless a branch below puts something back.
            match std::mem::replace(&mut self.cursor, Cursor::Done) {
                Cursor::Done => return None,
                Cursor::Start(args) => {
                    if let Err(e) = self.load(&args) {
                        return Some(Err(e));
                    }
                }
                Cursor::Page { mut items, next } => {
                    if let Some(item) = items.next() {
                        self.cursor = Cursor::Page { items, next };
                        return Some(Ok(item));
                    }
                    let link = next?;
                    let loaded = link
                        .continuation_args()
                        .and_then(|args| self.load(&args));
                    if let Err(e) = loaded {
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

impl<F: PageFetcher> FusedIterator for PagedSequence<F> {}

impl<F: PageFetcher> std::fmt::Debug for PagedSequence<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cursor = match &self.cursor {
            Cursor::Start(_) => "start",
            Cursor::Page { .. } => "page",
            Cursor::Done => "done",
        };
        f.debug_struct("PagedSequence")
            .field("cursor", &cursor)
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}
