//! The generic record engine.
//!
//! [`Model`] runs create/read/update/delete, aggregation and streaming operations for any
//! [`Record`] or [`AggregateSpec`](crate::aggregate::AggregateSpec) type over a
//! [`StoreBackend`]. Result types are chosen by the type parameter of each call, so rows
//! decode straight into the caller's concrete type.
//!
//! Operations are grouped by concern:
//!
//! - collection bootstrap ([`Model::ensure_collections`]) in this module
//! - direct writes and reads in `crud`
//! - pipeline reads in `pipe`
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{memory::InMemoryStore, model::Model};
//!
//! let model = Model::new(InMemoryStore::new());
//! let id = model.save(&mut user, Some(&operator)).await?;
//! let users = model.find(&User::default(), None).await?;
//! ```

mod crud;
mod pipe;

use bson::{Bson, Document, oid::ObjectId};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    backend::{StoreBackend, WriteFailure},
    cache::CollectionCache,
    error::{DocumentStoreError, DocumentStoreResult},
    record::{CollectionSpec, ID_FIELD, Record},
};

/// Server-side time bound applied to direct counts unless configured otherwise.
pub const DEFAULT_COUNT_MAX_TIME: Duration = Duration::from_secs(2);

/// Tunables of a [`Model`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Server-side time bound of direct counts; `None` leaves counts unbounded.
    pub count_max_time: Option<Duration>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { count_max_time: Some(DEFAULT_COUNT_MAX_TIME) }
    }
}

/// Generic record engine over a database handle.
///
/// The engine keeps no per-call state. The only shared state is its [`CollectionCache`],
/// which is owned by this instance unless one is shared through [`ModelBuilder::cache`].
#[derive(Debug)]
pub struct Model<B: StoreBackend> {
    backend: B,
    cache: Arc<CollectionCache>,
    config: ModelConfig,
}

impl<B: StoreBackend> Model<B> {
    /// Creates an engine with a private collection cache and default configuration.
    pub fn new(backend: B) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: B) -> ModelBuilder<B> {
        ModelBuilder::new(backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &Arc<CollectionCache> {
        &self.cache
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Makes sure the collection of every given value exists, creating missing ones.
    ///
    /// Collections already in the cache are skipped without a round trip. Missing
    /// collections are created with their declared indexes, or bare when none are declared,
    /// and then cached. The cache stays locked for the whole call, so concurrent callers
    /// never create the same collection twice.
    ///
    /// A failure to bootstrap one collection is logged and reported in the returned
    /// [`Bootstrap`] without stopping the others.
    pub async fn ensure_collections(&self, specs: &[&dyn CollectionSpec]) -> Bootstrap {
        let mut report = Bootstrap::default();
        let mut known = self.cache.lock().await;

        for spec in specs {
            let name = spec.collection_name();
            if name.is_empty() || known.contains(name) {
                continue;
            }

            match self.bootstrap(*spec).await {
                Ok(created) => {
                    if created {
                        report.created.push(name.to_string());
                    }
                    known.insert(name.to_string());
                }
                Err(err) => {
                    warn!(collection = name, error = %err, "collection bootstrap failed");
                    report.failed.push((name.to_string(), err));
                }
            }
        }

        report
    }

    /// Creates the collection of `spec` if the database does not have it yet.
    ///
    /// Returns whether a create call was issued.
    async fn bootstrap(&self, spec: &dyn CollectionSpec) -> DocumentStoreResult<bool> {
        let name = spec.collection_name();
        debug!(collection = name, "checking collection");

        let exists = self
            .backend
            .collection_exists(name)
            .await
            .unwrap_or_else(|err| {
                warn!(collection = name, error = %err, "collection lookup failed");
                false
            });
        if exists {
            return Ok(false);
        }

        let indexes = spec.index_specs();
        if indexes.is_empty() {
            self.backend.create_collection(name).await?;
        } else {
            let created = self.backend.create_indexes(name, indexes).await?;
            info!(collection = name, indexes = ?created, "created indexes");
        }

        info!(collection = name, "collection created");
        Ok(true)
    }

    async fn ensure_one(&self, spec: &dyn CollectionSpec) {
        self.ensure_collections(&[spec]).await;
    }
}

/// Outcome of [`Model::ensure_collections`].
#[derive(Debug, Default)]
pub struct Bootstrap {
    /// Collections created by this call.
    pub created: Vec<String>,
    /// Collections that could not be verified or created.
    pub failed: Vec<(String, DocumentStoreError)>,
}

impl Bootstrap {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`Model::batch_save`].
#[derive(Debug)]
pub struct BatchSaveOutcome<R> {
    /// Identities of inserted records, in database response order.
    pub inserted: Vec<Bson>,
    /// Records the database rejected, in input order.
    pub failed: Vec<R>,
    /// Rejection details, by position in the input.
    pub failures: Vec<WriteFailure>,
}

impl<R> BatchSaveOutcome<R> {
    /// Returns `true` when some but not all records were rejected.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() && !self.inserted.is_empty()
    }
}

impl<R> Default for BatchSaveOutcome<R> {
    fn default() -> Self {
        Self { inserted: Vec::new(), failed: Vec::new(), failures: Vec::new() }
    }
}

/// Outcome of [`Model::batch_update`].
///
/// Zero modified documents is reported through the counts, not as an error.
#[derive(Debug)]
pub struct BatchUpdateOutcome<R> {
    pub matched: u64,
    pub modified: u64,
    /// Identities of records inserted by the upserts.
    pub upserted: Vec<Bson>,
    /// Records whose operation the database rejected, in input order.
    pub failed: Vec<R>,
    pub failures: Vec<WriteFailure>,
}

impl<R> Default for BatchUpdateOutcome<R> {
    fn default() -> Self {
        Self {
            matched: 0,
            modified: 0,
            upserted: Vec::new(),
            failed: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Builder for [`Model`] instances.
pub struct ModelBuilder<B: StoreBackend> {
    backend: B,
    cache: Option<Arc<CollectionCache>>,
    config: ModelConfig,
}

impl<B: StoreBackend> ModelBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, cache: None, config: ModelConfig::default() }
    }

    /// Shares an existing collection cache instead of creating a private one.
    pub fn cache(mut self, cache: Arc<CollectionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the server-side time bound of direct counts.
    pub fn count_max_time(mut self, max_time: Option<Duration>) -> Self {
        self.config.count_max_time = max_time;
        self
    }

    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Model<B> {
        Model {
            backend: self.backend,
            cache: self.cache.unwrap_or_default(),
            config: self.config,
        }
    }
}

/// Returns the collection name of `spec`, rejecting empty names.
pub(crate) fn collection_of<S: CollectionSpec + ?Sized>(spec: &S) -> DocumentStoreResult<String> {
    match spec.collection_name() {
        "" => Err(DocumentStoreError::Usage("record has no collection name".into())),
        name => Ok(name.to_string()),
    }
}

/// Returns the identity of `record`, rejecting records that have none.
pub(crate) fn identity_of<R: Record>(record: &R) -> DocumentStoreResult<Bson> {
    match record.id() {
        Some(Bson::Null) | None => Err(DocumentStoreError::Usage(format!(
            "record in collection {} has no identity",
            record.collection_name(),
        ))),
        Some(id) => Ok(id),
    }
}

/// Assigns a fresh ObjectId to a document that lacks an `_id`.
pub(crate) fn with_identity(mut document: Document) -> Document {
    match document.get(ID_FIELD) {
        None | Some(Bson::Null) => {
            document.insert(ID_FIELD, ObjectId::new());
            document
        }
        Some(_) => document,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn missing_or_null_identity_is_assigned() {
        let assigned = with_identity(doc! { "name": "a" });
        assert!(matches!(assigned.get(ID_FIELD), Some(Bson::ObjectId(_))));

        let assigned = with_identity(doc! { "_id": Bson::Null });
        assert!(matches!(assigned.get(ID_FIELD), Some(Bson::ObjectId(_))));

        let kept = with_identity(doc! { "_id": "k1" });
        assert_eq!(kept.get_str(ID_FIELD).unwrap(), "k1");
    }
}
