//! Count-plus-data pagination over direct queries and pipelines.
//!
//! A [`PaginationSource`] pairs a total count with a page of formatted rows for the same
//! logical filter. Two implementations are provided:
//!
//! - [`QueryPaginationSource`] counts directly against the collection and pages with
//!   [`Model::page_find_sorted`].
//! - [`PipelinePaginationSource`] pages with [`Model::page_pipe_find`] and counts either
//!   directly or through the pipeline. The two count strategies have separate constructors
//!   because a pipeline count runs every stage and can cost far more than a direct count.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::pagination::{PaginationSource, Row};
//! use docmodel::page::PageRequest;
//!
//! let source = model.pagination_source(User::default(), None, vec![Sort::asc("name")]);
//! let formatter = |user: &User| {
//!     let mut row = Row::new();
//!     row.insert("name".into(), user.name.clone().into());
//!     row
//! };
//!
//! let page = source.page(PageRequest::new(20, 1), &formatter).await?;
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    aggregate::AggregateSpec,
    backend::StoreBackend,
    error::DocumentStoreResult,
    model::Model,
    page::{Page, PageRequest},
    query::{Expr, Sort},
    record::Record,
};

/// A formatted output row.
pub type Row = Map<String, Value>;

/// Turns one decoded value into an output row.
pub type RowFormatter<T> = dyn Fn(&T) -> Row + Send + Sync;

/// Formats every value and returns the rows with the number of values formatted.
pub fn format_rows<T>(items: &[T], formatter: &RowFormatter<T>) -> (Vec<Row>, usize) {
    let rows = items.iter().map(formatter).collect::<Vec<_>>();
    let matched = rows.len();
    (rows, matched)
}

/// Formats a single value as a one-row result.
pub fn format_one<T>(item: &T, formatter: &RowFormatter<T>) -> (Vec<Row>, usize) {
    format_rows(std::slice::from_ref(item), formatter)
}

/// A pairing of a total count and pages of formatted rows over one filter.
#[async_trait]
pub trait PaginationSource: Send + Sync {
    /// The type rows are decoded into before formatting.
    type Item: Send + Sync;

    /// Returns the total number of matches.
    async fn count(&self) -> DocumentStoreResult<u64>;

    /// Returns one page of formatted rows.
    ///
    /// Returns `Ok(None)` when the page has no rows. Non-positive `limit` and `page` fall
    /// back to 50 and 1.
    async fn data(
        &self,
        limit: i64,
        page: i64,
        formatter: &RowFormatter<Self::Item>,
    ) -> DocumentStoreResult<Option<Vec<Row>>>;

    /// Composes [`count`](PaginationSource::count) and [`data`](PaginationSource::data)
    /// into a [`Page`] with navigation metadata.
    async fn page(
        &self,
        request: PageRequest,
        formatter: &RowFormatter<Self::Item>,
    ) -> DocumentStoreResult<Page<Row>> {
        let count = self.count().await?;
        let rows = self
            .data(request.limit, request.page, formatter)
            .await?
            .unwrap_or_default();

        Ok(Page::builder(rows).with_navigation(&request, count).build())
    }
}

fn non_empty(rows: Vec<Row>, matched: usize) -> Option<Vec<Row>> {
    if matched == 0 { None } else { Some(rows) }
}

/// Pagination over a direct query of the prototype's collection.
#[derive(Debug)]
pub struct QueryPaginationSource<'m, B: StoreBackend, R: Record> {
    model: &'m Model<B>,
    prototype: R,
    filter: Option<Expr>,
    sort: Vec<Sort>,
}

impl<'m, B: StoreBackend, R: Record> QueryPaginationSource<'m, B, R> {
    pub fn new(model: &'m Model<B>, prototype: R, filter: Option<Expr>, sort: Vec<Sort>) -> Self {
        Self { model, prototype, filter, sort }
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }
}

#[async_trait]
impl<B: StoreBackend, R: Record> PaginationSource for QueryPaginationSource<'_, B, R> {
    type Item = R;

    async fn count(&self) -> DocumentStoreResult<u64> {
        self.model
            .count_documents(&self.prototype, self.filter.clone())
            .await
    }

    async fn data(
        &self,
        limit: i64,
        page: i64,
        formatter: &RowFormatter<R>,
    ) -> DocumentStoreResult<Option<Vec<Row>>> {
        let items = self
            .model
            .page_find_sorted(&self.prototype, self.filter.clone(), self.sort.clone(), limit, page)
            .await?;
        let (rows, matched) = format_rows(&items, formatter);

        Ok(non_empty(rows, matched))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountStrategy {
    Direct,
    Pipeline,
}

/// Pagination over the pipeline of an [`AggregateSpec`].
///
/// Built through [`Model::pipe_pagination_source`] (direct count) or
/// [`Model::pipe_counted_pagination_source`] (pipeline count).
#[derive(Debug)]
pub struct PipelinePaginationSource<'m, B: StoreBackend, A: AggregateSpec> {
    model: &'m Model<B>,
    spec: A,
    filter: Option<Expr>,
    sort: Vec<Sort>,
    strategy: CountStrategy,
}

impl<B: StoreBackend, A: AggregateSpec> PipelinePaginationSource<'_, B, A> {
    /// Returns `true` when the count runs the full pipeline.
    pub fn counts_through_pipeline(&self) -> bool {
        self.strategy == CountStrategy::Pipeline
    }
}

#[async_trait]
impl<B: StoreBackend, A: AggregateSpec> PaginationSource for PipelinePaginationSource<'_, B, A> {
    type Item = A;

    async fn count(&self) -> DocumentStoreResult<u64> {
        match self.strategy {
            CountStrategy::Direct => {
                self.model
                    .count_documents(&self.spec, self.filter.clone())
                    .await
            }
            CountStrategy::Pipeline => {
                self.model
                    .count_aggr_documents(&self.spec, self.filter.clone())
                    .await
            }
        }
    }

    async fn data(
        &self,
        limit: i64,
        page: i64,
        formatter: &RowFormatter<A>,
    ) -> DocumentStoreResult<Option<Vec<Row>>> {
        let items = self
            .model
            .page_pipe_find(&self.spec, self.filter.clone(), self.sort.clone(), limit, page)
            .await?;
        let (rows, matched) = format_rows(&items, formatter);

        Ok(non_empty(rows, matched))
    }
}

impl<B: StoreBackend> Model<B> {
    /// Paginates a direct query of the prototype's collection.
    pub fn pagination_source<R: Record>(
        &self,
        prototype: R,
        filter: Option<Expr>,
        sort: Vec<Sort>,
    ) -> QueryPaginationSource<'_, B, R> {
        QueryPaginationSource::new(self, prototype, filter, sort)
    }

    /// Paginates a pipeline, counting directly against the base collection with `filter`.
    ///
    /// The count ignores the pipeline, so it is only exact when the pipeline neither drops
    /// nor multiplies rows.
    pub fn pipe_pagination_source<A: AggregateSpec>(
        &self,
        spec: A,
        filter: Option<Expr>,
        sort: Vec<Sort>,
    ) -> PipelinePaginationSource<'_, B, A> {
        PipelinePaginationSource {
            model: self,
            spec,
            filter,
            sort,
            strategy: CountStrategy::Direct,
        }
    }

    /// Paginates a pipeline, counting by running it with a terminal count stage.
    pub fn pipe_counted_pagination_source<A: AggregateSpec>(
        &self,
        spec: A,
        filter: Option<Expr>,
        sort: Vec<Sort>,
    ) -> PipelinePaginationSource<'_, B, A> {
        PipelinePaginationSource {
            model: self,
            spec,
            filter,
            sort,
            strategy: CountStrategy::Pipeline,
        }
    }
}
