//! In-memory storage implementation for the record engine.
//!
//! This module provides a simple backend that keeps documents as BSON in insertion order
//! behind an async-safe read-write lock.

use std::{collections::HashMap, sync::Arc, time::Duration};
use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;

use docmodel_core::{
    aggregate::Pipeline,
    backend::{
        BulkUpdateOutcome, DocumentStream, InsertManyOutcome, StoreBackend, StoreBackendBuilder,
        UpdateOutcome, WriteFailure,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
    record::IndexSpec,
    update::{Update, UpdateOp},
};

use crate::{
    evaluator::{DocumentEvaluator, compare_documents, lookup},
    pipeline,
    update::{apply_update, seed_from_filter},
};

const ID_FIELD: &str = "_id";

type StoreMap = HashMap<String, Collection>;

/// Documents of one collection in natural (insertion) order, with its declared indexes.
#[derive(Debug, Default, Clone)]
struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    fn position_of(&self, id: &Bson) -> Option<usize> {
        self.documents
            .iter()
            .position(|document| document.get(ID_FIELD) == Some(id))
    }

    fn matching(&self, filter: Option<&Expr>) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::matches(document, filter)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Checks `_id` and unique index constraints for `document`, ignoring the document at
    /// `replacing`.
    fn check_unique(
        &self,
        name: &str,
        document: &Document,
        replacing: Option<usize>,
    ) -> DocumentStoreResult<()> {
        let id = document.get(ID_FIELD).ok_or_else(|| {
            DocumentStoreError::InvalidDocument("document has no _id".to_string())
        })?;

        if let Some(position) = self.position_of(id) {
            if Some(position) != replacing {
                return Err(DocumentStoreError::DocumentAlreadyExists(
                    display_id(id),
                    name.to_string(),
                ));
            }
        }

        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = index_key(index, document);
            let clash = self
                .documents
                .iter()
                .enumerate()
                .any(|(position, other)| Some(position) != replacing && index_key(index, other) == key);

            if clash {
                return Err(DocumentStoreError::DocumentAlreadyExists(
                    display_id(id),
                    name.to_string(),
                ));
            }
        }

        Ok(())
    }

    fn insert(&mut self, name: &str, document: Document) -> DocumentStoreResult<Bson> {
        self.check_unique(name, &document, None)?;
        let id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
        self.documents.push(document);
        Ok(id)
    }

    /// Applies one update to the first (or every) matching document, upserting on request.
    ///
    /// Updates are computed before any document is replaced, so a failure leaves the
    /// collection untouched.
    fn update(
        &mut self,
        name: &str,
        filter: Option<&Expr>,
        update: &Update,
        upsert: bool,
        multi: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut positions = self.matching(filter)?;
        if !multi {
            positions.truncate(1);
        }

        if positions.is_empty() {
            if !upsert {
                return Ok(UpdateOutcome::default());
            }

            let mut document = seed_from_filter(filter);
            apply_update(&mut document, update)?;
            if document.get(ID_FIELD).is_none() {
                document.insert(ID_FIELD, ObjectId::new());
            }
            let id = self.insert(name, document)?;

            return Ok(UpdateOutcome { matched: 0, modified: 0, upserted_id: Some(id) });
        }

        let mut replacements = Vec::with_capacity(positions.len());
        for position in positions.iter().copied() {
            let mut document = self.documents[position].clone();
            apply_update(&mut document, update)?;
            self.check_unique(name, &document, Some(position))?;
            replacements.push((position, document));
        }

        let mut outcome = UpdateOutcome { matched: positions.len() as u64, ..UpdateOutcome::default() };
        for (position, document) in replacements {
            if self.documents[position] != document {
                outcome.modified += 1;
                self.documents[position] = document;
            }
        }

        Ok(outcome)
    }

    fn delete(&mut self, filter: Option<&Expr>, multi: bool) -> DocumentStoreResult<u64> {
        let mut positions = self.matching(filter)?;
        if !multi {
            positions.truncate(1);
        }

        for position in positions.iter().rev() {
            self.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    fn find(&self, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let mut documents = Vec::new();
        for document in &self.documents {
            if DocumentEvaluator::matches(document, query.filter.as_ref())? {
                documents.push(document.clone());
            }
        }

        if !query.sort.is_empty() {
            documents.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        Ok(documents
            .into_iter()
            .skip(query.offset.unwrap_or(0) as usize)
            .take(query.limit.map(|n| n as usize).unwrap_or(usize::MAX))
            .collect())
    }
}

fn index_key(index: &IndexSpec, document: &Document) -> Vec<Bson> {
    index
        .keys
        .iter()
        .map(|(field, _)| lookup(document, field).cloned().unwrap_or(Bson::Null))
        .collect()
}

fn index_name(index: &IndexSpec) -> String {
    match &index.name {
        Some(name) => name.clone(),
        None => index
            .keys
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_"),
    }
}

fn display_id(id: &Bson) -> String {
    match id {
        Bson::String(value) => value.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

/// Thread-safe in-memory document storage backend.
///
/// Implements [`StoreBackend`] entirely in memory using async-aware read-write locks. It
/// honours `_id` uniqueness, declared unique indexes, unordered bulk writes with itemized
/// failures, and interprets every pipeline stage except [`Raw`](docmodel_core::aggregate::Stage::Raw).
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to
/// be shared across async tasks. Clones share the same underlying data.
///
/// # Performance
///
/// Queries scan every document of a collection; indexes are only used for uniqueness.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.insert_one("users", doc! { "_id": "u1", "name": "Alice" }).await?;
/// assert_eq!(store.count_documents("users", None, None).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(StoreMap::new())) }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns the indexes declared on a collection.
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|col| col.indexes.clone())
            .unwrap_or_default()
    }

    async fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|col| col.documents.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        Ok(self.store.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexSpec>,
    ) -> DocumentStoreResult<Vec<String>> {
        let mut store = self.store.write().await;
        let collection_map = store.entry(collection.to_string()).or_default();

        let mut names = Vec::with_capacity(indexes.len());
        for index in indexes {
            if index.keys.is_empty() {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "index on {collection} declares no keys"
                )));
            }
            names.push(index_name(&index));
            collection_map.indexes.push(index);
        }

        Ok(names)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        self.store
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(collection, document)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        let mut store = self.store.write().await;
        let collection_map = store.entry(collection.to_string()).or_default();

        let mut outcome = InsertManyOutcome::default();
        for (index, document) in documents.into_iter().enumerate() {
            match collection_map.insert(collection, document) {
                Ok(id) => outcome.inserted.push((index, id)),
                Err(err) => outcome.failures.push(WriteFailure { index, message: err.to_string() }),
            }
        }

        Ok(outcome)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.store
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .update(collection, filter.as_ref(), &update, upsert, false)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut store = self.store.write().await;
        match store.get_mut(collection) {
            Some(collection_map) => collection_map.update(collection, filter.as_ref(), &update, false, true),
            None => Ok(UpdateOutcome::default()),
        }
    }

    async fn bulk_update(
        &self,
        collection: &str,
        operations: Vec<UpdateOp>,
    ) -> DocumentStoreResult<BulkUpdateOutcome> {
        let mut store = self.store.write().await;
        let collection_map = store.entry(collection.to_string()).or_default();

        let mut outcome = BulkUpdateOutcome::default();
        for (index, op) in operations.into_iter().enumerate() {
            match collection_map.update(collection, op.filter.as_ref(), &op.update, op.upsert, false) {
                Ok(result) => {
                    outcome.matched += result.matched;
                    outcome.modified += result.modified;
                    if let Some(id) = result.upserted_id {
                        outcome.upserted.push((index, id));
                    }
                }
                Err(err) => outcome.failures.push(WriteFailure { index, message: err.to_string() }),
            }
        }

        Ok(outcome)
    }

    async fn delete_one(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        match self.store.write().await.get_mut(collection) {
            Some(collection_map) => collection_map.delete(filter.as_ref(), false),
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        match self.store.write().await.get_mut(collection) {
            Some(collection_map) => collection_map.delete(filter.as_ref(), true),
            None => Ok(0),
        }
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        match self.store.read().await.get(collection) {
            Some(collection_map) => collection_map.find(query),
            None => Ok(Vec::new()),
        }
    }

    async fn find_stream(
        &self,
        collection: &str,
        query: Query,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        let documents = self.find(collection, query).await?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<Vec<Document>> {
        pipeline::run(self.snapshot(collection).await, pipeline)
    }

    async fn aggregate_stream(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        let documents = self.aggregate(collection, pipeline).await?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<Expr>,
        _max_time: Option<Duration>,
    ) -> DocumentStoreResult<u64> {
        match self.store.read().await.get(collection) {
            Some(collection_map) => Ok(collection_map.matching(filter.as_ref())?.len() as u64),
            None => Ok(0),
        }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// Optionally seeds collections so a test can start from a known database state.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().collection("users").build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    collections: Vec<String>,
}

impl InMemoryStoreBuilder {
    /// Creates the named collection up front.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collections.push(name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();
        for name in &self.collections {
            store.create_collection(name).await?;
        }
        Ok(store)
    }
}
