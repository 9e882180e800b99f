//! Page requests and page responses.
//!
//! [`PageRequest`] carries the caller's limit and 1-indexed page number and normalizes them:
//! non-positive values fall back to [`DEFAULT_LIMIT`] and page 1. [`Page`] is the response a
//! [`PaginationSource`](crate::pagination::PaginationSource) assembles from a count and a
//! page of formatted rows.

use serde::{Deserialize, Serialize};

/// Page size used when the requested limit is not positive.
pub const DEFAULT_LIMIT: i64 = 50;

/// Page number used when the requested page is not positive.
pub const DEFAULT_PAGE: i64 = 1;

/// A single page of results with navigation metadata.
///
/// # Example
///
/// ```ignore
/// use docmodel::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of items across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<i64>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<i64>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page with custom settings.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<i64>,
    previous_page: Option<i64>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<i64>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<i64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    /// Derives next/previous page numbers from the request and the total count.
    pub fn with_navigation(self, request: &PageRequest, count: u64) -> Self {
        let end = request.skip().saturating_add(request.limit() as u64);
        let next = if end < count { Some(request.page() + 1) } else { None };
        let previous = if request.page() > 1 { Some(request.page() - 1) } else { None };

        self.with_count(count)
            .with_next_page(next)
            .with_previous_page(previous)
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Limit and 1-indexed page number of a paginated read.
///
/// The raw values are kept as supplied; the accessors return normalized values.
///
/// ```ignore
/// use docmodel::page::PageRequest;
///
/// let request = PageRequest::new(0, 0);
/// assert_eq!((request.limit(), request.page()), (50, 1));
/// assert_eq!(PageRequest::new(20, 3).skip(), 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub page: i64,
}

impl PageRequest {
    pub fn new(limit: i64, page: i64) -> Self {
        Self { limit, page }
    }

    /// Page size, [`DEFAULT_LIMIT`] when the requested limit is not positive.
    pub fn limit(&self) -> i64 {
        if self.limit <= 0 { DEFAULT_LIMIT } else { self.limit }
    }

    /// Page number, [`DEFAULT_PAGE`] when the requested page is not positive.
    pub fn page(&self) -> i64 {
        if self.page <= 0 { DEFAULT_PAGE } else { self.page }
    }

    /// Number of rows preceding this page.
    pub fn skip(&self) -> u64 {
        (self.limit() as u64).saturating_mul((self.page() - 1) as u64)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT, page: DEFAULT_PAGE }
    }
}
