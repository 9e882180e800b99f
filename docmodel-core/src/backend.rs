//! Database handle abstraction the engine runs on.
//!
//! The [`StoreBackend`] trait is the only view the engine has of the database: a handle
//! scoped to one database, exposing collection-level operations. The engine never opens,
//! pools or closes connections; whoever builds the backend owns that lifecycle.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! let id = backend.insert_one("users", doc! { "_id": "u1", "name": "Alice" }).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::{
    aggregate::Pipeline,
    error::DocumentStoreResult,
    query::{Expr, Query},
    record::IndexSpec,
    update::{Update, UpdateOp},
};

/// A stream of raw documents read from a server-side cursor.
pub type DocumentStream<'a> = BoxStream<'a, DocumentStoreResult<Document>>;

/// Failure of one item of a bulk write, by its position in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    /// Position of the failed item in the submitted batch.
    pub index: usize,
    pub message: String,
}

/// Result of an unordered multi-document insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyOutcome {
    /// Identities of inserted documents, keyed by their position in the request, in
    /// response order.
    pub inserted: Vec<(usize, Bson)>,
    /// Items the database rejected.
    pub failures: Vec<WriteFailure>,
}

/// Result of a single update call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    /// Identity of the document inserted by an upsert.
    pub upserted_id: Option<Bson>,
}

/// Result of a bulk update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkUpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    /// Identities inserted by upserts, keyed by position in the request.
    pub upserted: Vec<(usize, Bson)>,
    /// Operations the database rejected.
    pub failures: Vec<WriteFailure>,
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Cancellation
///
/// Every operation is a plain future. Dropping it cancels the call; deadlines are applied
/// by the caller around the call (e.g. `tokio::time::timeout`).
///
/// # Error Handling
///
/// Driver and network errors are returned as
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend) without retry.
/// Bulk writes report per-item failures in their outcome instead of failing the call.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Reports whether a collection exists.
    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool>;

    /// Creates an empty collection.
    ///
    /// Creating a collection that already exists is not an error.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Creates the given indexes, implicitly creating the collection.
    ///
    /// # Returns
    ///
    /// The names of the created indexes.
    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexSpec>,
    ) -> DocumentStoreResult<Vec<String>>;

    /// Inserts one document and returns its `_id`.
    ///
    /// The document must already carry an `_id`.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson>;

    /// Inserts documents without ordering, so one rejected document does not stop the rest.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyOutcome>;

    /// Applies an update to the first matching document.
    async fn update_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies an update to every matching document.
    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Executes independent update operations as one unordered batch.
    async fn bulk_update(
        &self,
        collection: &str,
        operations: Vec<UpdateOp>,
    ) -> DocumentStoreResult<BulkUpdateOutcome>;

    /// Deletes the first matching document and returns the deleted count.
    async fn delete_one(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64>;

    /// Deletes every matching document and returns the deleted count.
    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64>;

    /// Returns every document matching the query.
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>>;

    /// Opens a cursor over the documents matching the query.
    async fn find_stream(
        &self,
        collection: &str,
        query: Query,
    ) -> DocumentStoreResult<DocumentStream<'static>>;

    /// Runs a pipeline and returns every resulting row.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Runs a pipeline and opens a cursor over its rows.
    async fn aggregate_stream(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<DocumentStream<'static>>;

    /// Counts the documents matching the filter directly against the collection.
    ///
    /// `max_time` bounds the server-side execution when the backend supports it.
    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<Expr>,
        max_time: Option<Duration>,
    ) -> DocumentStoreResult<u64>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        (**self).collection_exists(name).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (**self).create_collection(name).await
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexSpec>,
    ) -> DocumentStoreResult<Vec<String>> {
        (**self).create_indexes(collection, indexes).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        (**self).insert_many(collection, documents).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (**self)
            .update_one(collection, filter, update, upsert)
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (**self)
            .update_many(collection, filter, update)
            .await
    }

    async fn bulk_update(
        &self,
        collection: &str,
        operations: Vec<UpdateOp>,
    ) -> DocumentStoreResult<BulkUpdateOutcome> {
        (**self).bulk_update(collection, operations).await
    }

    async fn delete_one(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        (**self).delete_many(collection, filter).await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        (**self).find(collection, query).await
    }

    async fn find_stream(
        &self,
        collection: &str,
        query: Query,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        (**self).find_stream(collection, query).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).aggregate(collection, pipeline).await
    }

    async fn aggregate_stream(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        (**self).aggregate_stream(collection, pipeline).await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<Expr>,
        max_time: Option<Duration>,
    ) -> DocumentStoreResult<u64> {
        (**self)
            .count_documents(collection, filter, max_time)
            .await
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend,
{
    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        (**self).collection_exists(name).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (**self).create_collection(name).await
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexSpec>,
    ) -> DocumentStoreResult<Vec<String>> {
        (**self).create_indexes(collection, indexes).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        (**self).insert_many(collection, documents).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (**self)
            .update_one(collection, filter, update, upsert)
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (**self)
            .update_many(collection, filter, update)
            .await
    }

    async fn bulk_update(
        &self,
        collection: &str,
        operations: Vec<UpdateOp>,
    ) -> DocumentStoreResult<BulkUpdateOutcome> {
        (**self).bulk_update(collection, operations).await
    }

    async fn delete_one(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        (**self).delete_many(collection, filter).await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        (**self).find(collection, query).await
    }

    async fn find_stream(
        &self,
        collection: &str,
        query: Query,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        (**self).find_stream(collection, query).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).aggregate(collection, pipeline).await
    }

    async fn aggregate_stream(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        (**self).aggregate_stream(collection, pipeline).await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<Expr>,
        max_time: Option<Duration>,
    ) -> DocumentStoreResult<u64> {
        (**self)
            .count_documents(collection, filter, max_time)
            .await
    }
}

/// Factory trait for backends that need asynchronous setup.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
