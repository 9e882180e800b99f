//! Reusable streaming reads bound to a prototype and a filter.

use async_trait::async_trait;

use crate::{
    aggregate::AggregateSpec,
    backend::StoreBackend,
    error::DocumentStoreResult,
    model::Model,
    query::{Expr, Query},
    record::Record,
};

/// Callback invoked once per streamed row.
pub type RowCallback<'a, T> = dyn FnMut(&T) -> DocumentStoreResult<()> + Send + 'a;

/// A read that streams its rows through a callback.
#[async_trait]
pub trait DataSource: Send {
    type Item: Send + Sync;

    /// Streams every row through `callback`, stopping at the first callback error.
    async fn exec(&mut self, callback: &mut RowCallback<'_, Self::Item>) -> DocumentStoreResult<()>;
}

/// Streams a direct query through [`Model::find_and_exec_by_query`].
///
/// After a run, [`prototype`](FindDataSource::prototype) holds the last streamed row.
#[derive(Debug)]
pub struct FindDataSource<'m, B: StoreBackend, R: Record> {
    model: &'m Model<B>,
    prototype: R,
    query: Query,
}

impl<B: StoreBackend, R: Record> FindDataSource<'_, B, R> {
    pub fn prototype(&self) -> &R {
        &self.prototype
    }

    pub fn into_prototype(self) -> R {
        self.prototype
    }
}

#[async_trait]
impl<B: StoreBackend, R: Record> DataSource for FindDataSource<'_, B, R> {
    type Item = R;

    async fn exec(&mut self, callback: &mut RowCallback<'_, R>) -> DocumentStoreResult<()> {
        self.model
            .find_and_exec_by_query(&mut self.prototype, self.query.clone(), callback)
            .await
    }
}

/// Streams the pipeline of an [`AggregateSpec`] through [`Model::pipe_find_and_exec`].
#[derive(Debug)]
pub struct PipeFindDataSource<'m, B: StoreBackend, A: AggregateSpec> {
    model: &'m Model<B>,
    spec: A,
    filter: Option<Expr>,
}

impl<B: StoreBackend, A: AggregateSpec> PipeFindDataSource<'_, B, A> {
    pub fn prototype(&self) -> &A {
        &self.spec
    }

    pub fn into_prototype(self) -> A {
        self.spec
    }
}

#[async_trait]
impl<B: StoreBackend, A: AggregateSpec> DataSource for PipeFindDataSource<'_, B, A> {
    type Item = A;

    async fn exec(&mut self, callback: &mut RowCallback<'_, A>) -> DocumentStoreResult<()> {
        self.model
            .pipe_find_and_exec(&mut self.spec, self.filter.clone(), callback)
            .await
    }
}

impl<B: StoreBackend> Model<B> {
    /// Binds a prototype and query into a reusable [`DataSource`].
    pub fn find_source<R: Record>(&self, prototype: R, query: Query) -> FindDataSource<'_, B, R> {
        FindDataSource { model: self, prototype, query }
    }

    /// Binds an aggregate spec and filter into a reusable [`DataSource`].
    pub fn pipe_find_source<A: AggregateSpec>(
        &self,
        spec: A,
        filter: Option<Expr>,
    ) -> PipeFindDataSource<'_, B, A> {
        PipeFindDataSource { model: self, spec, filter }
    }
}
