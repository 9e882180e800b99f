use bson::Bson;
use futures::TryStreamExt;
use tracing::debug;

use super::{Model, collection_of};
use crate::{
    aggregate::{AggregateSpec, COUNT_FIELD},
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    page::PageRequest,
    query::{Expr, Sort},
    record::decode,
};

impl<B: StoreBackend> Model<B> {
    /// Decodes the first row of the spec's pipeline into `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when the pipeline yields no rows.
    pub async fn pipe_find_one<A: AggregateSpec>(
        &self,
        spec: &mut A,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<()> {
        let collection = collection_of(spec)?;
        let mut cursor = self
            .backend
            .aggregate_stream(&collection, spec.pipeline(filter))
            .await?;

        match cursor.try_next().await? {
            Some(document) => {
                *spec = decode(document)?;
                Ok(())
            }
            None => Err(DocumentStoreError::NotFound(collection)),
        }
    }

    /// Returns every row of the spec's pipeline.
    pub async fn pipe_find<A: AggregateSpec>(
        &self,
        spec: &A,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<Vec<A>> {
        self.backend
            .aggregate(&collection_of(spec)?, spec.pipeline(filter))
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Streams every row of the spec's pipeline through `callback`.
    ///
    /// Same contract as [`find_and_exec`](Model::find_and_exec): a callback error stops the
    /// stream, and the last decoded row replaces `spec` once the cursor is exhausted.
    pub async fn pipe_find_and_exec<A, F>(
        &self,
        spec: &mut A,
        filter: Option<Expr>,
        mut callback: F,
    ) -> DocumentStoreResult<()>
    where
        A: AggregateSpec,
        F: FnMut(&A) -> DocumentStoreResult<()>,
    {
        let collection = collection_of(spec)?;
        let mut cursor = self
            .backend
            .aggregate_stream(&collection, spec.pipeline(filter))
            .await?;
        let mut last = None;

        while let Some(document) = cursor.try_next().await? {
            let row: A = decode(document)?;
            callback(&row)?;
            last = Some(row);
        }

        if let Some(row) = last {
            *spec = row;
        }

        Ok(())
    }

    /// Returns one page of the spec's pipeline.
    ///
    /// Sort, skip and limit stages are appended after the spec's own stages. Non-positive
    /// `limit` and `page` fall back to 50 and 1.
    pub async fn page_pipe_find<A: AggregateSpec>(
        &self,
        spec: &A,
        filter: Option<Expr>,
        sort: Vec<Sort>,
        limit: i64,
        page: i64,
    ) -> DocumentStoreResult<Vec<A>> {
        let request = PageRequest::new(limit, page);
        let pipeline = spec
            .pipeline(filter)
            .sort(sort)
            .skip(request.skip())
            .limit(request.limit() as u64);

        self.backend
            .aggregate(&collection_of(spec)?, pipeline)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Counts the rows of the spec's pipeline by appending a terminal count stage.
    ///
    /// An empty pipeline result counts as zero.
    pub async fn count_aggr_documents<A: AggregateSpec>(
        &self,
        spec: &A,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<u64> {
        let collection = collection_of(spec)?;
        let rows = self
            .backend
            .aggregate(&collection, spec.pipeline(filter).count())
            .await?;

        let count = rows
            .first()
            .and_then(|row| row.get(COUNT_FIELD))
            .map(count_value)
            .unwrap_or(0);
        debug!(collection = collection.as_str(), count, "pipeline count");

        Ok(count)
    }
}

fn count_value(value: &Bson) -> u64 {
    match value {
        Bson::Int32(n) => (*n).max(0) as u64,
        Bson::Int64(n) => (*n).max(0) as u64,
        Bson::Double(n) if *n > 0.0 => *n as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_rows_accept_any_numeric_width() {
        assert_eq!(count_value(&Bson::Int32(3)), 3);
        assert_eq!(count_value(&Bson::Int64(7)), 7);
        assert_eq!(count_value(&Bson::Double(2.0)), 2);
        assert_eq!(count_value(&Bson::String("x".into())), 0);
    }
}
