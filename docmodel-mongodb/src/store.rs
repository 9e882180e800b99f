use std::{collections::HashSet, time::Duration};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    error::{Error as MongoError, ErrorKind, InsertManyError, WriteFailure as MongoWriteFailure},
    options::{ClientOptions, CountOptions, FindOptions, IndexOptions},
};
use tracing::{debug, warn};

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

use crate::query::{MongoQueryTranslator, pipeline_documents, saturating_i64, sort_document};

const NAMESPACE_EXISTS: i32 = 48;
const UPDATE_BATCH_SIZE: usize = 1000;
const DUPLICATE_KEY: i32 = 11000;
const NOT_SUPPORTED_IN_TRANSACTION: &str = "OperationNotSupportedInTransaction";

fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn command_code(err: &MongoError) -> Option<(i32, &str)> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some((command.code, command.code_name.as_str())),
        _ => None,
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(MongoWriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn display_id(id: Option<&Bson>) -> String {
    match id {
        Some(Bson::String(value)) => value.clone(),
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn update_statement(op: UpdateOp) -> DocumentStoreResult<Document> {
    Ok(doc! {
        "q": MongoQueryTranslator::filter(op.filter.as_ref())?,
        "u": op.update.to_document(),
        "upsert": op.upsert,
        "multi": false,
    })
}

fn count(reply: &Document, key: &str) -> u64 {
    match reply.get(key) {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Double(n)) if *n >= 0.0 => *n as u64,
        _ => 0,
    }
}

fn reply_index(entry: &Document) -> Option<usize> {
    match entry.get("index")? {
        Bson::Int32(n) => usize::try_from(*n).ok(),
        Bson::Int64(n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

/// Folds an `update` command reply into the outcome, shifting statement indexes by `offset`.
fn merge_update_reply(
    outcome: &mut BulkUpdateOutcome,
    reply: &Document,
    offset: usize,
) -> DocumentStoreResult<()> {
    if let Ok(concern) = reply.get_document("writeConcernError") {
        return Err(DocumentStoreError::Backend(
            concern.get_str("errmsg").unwrap_or("write concern error").to_string(),
        ));
    }

    let upserted = reply
        .get_array("upserted")
        .map(|entries| entries.iter().filter_map(Bson::as_document).collect::<Vec<_>>())
        .unwrap_or_default();

    outcome.matched += count(reply, "n").saturating_sub(upserted.len() as u64);
    outcome.modified += count(reply, "nModified");

    for entry in upserted {
        if let (Some(index), Some(id)) = (reply_index(entry), entry.get("_id")) {
            outcome.upserted.push((offset + index, id.clone()));
        }
    }

    if let Ok(errors) = reply.get_array("writeErrors") {
        for entry in errors.iter().filter_map(Bson::as_document) {
            if let Some(index) = reply_index(entry) {
                outcome.failures.push(WriteFailure {
                    index: offset + index,
                    message: entry.get_str("errmsg").unwrap_or_default().to_string(),
                });
            }
        }
    }

    Ok(())
}

fn index_model(index: IndexSpec) -> IndexModel {
    let keys = index
        .keys
        .iter()
        .map(|(field, direction)| (field.clone(), Bson::Int32(direction.as_i32())))
        .collect::<Document>();

    let mut options = IndexOptions::default();
    if index.unique {
        options.unique = Some(true);
    }
    options.name = index.name;

    IndexModel::builder()
        .keys(keys)
        .options(options)
        .build()
}

/// MongoDB backend over a database handle.
///
/// The store only borrows the connection lifecycle of a handle passed to
/// [`MongoDbStore::new`]; a store built from a DSN through [`MongoDbStoreBuilder`] owns its
/// client and closes it on [`shutdown`](StoreBackend::shutdown).
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    database: Database,
    client: Option<Client>,
}

impl MongoDbStore {
    /// Wraps a database handle managed by the caller.
    pub fn new(database: Database) -> Self {
        Self { database, client: None }
    }

    /// Wraps a client the store owns, addressing the named database.
    pub fn with_client(client: Client, database: &str) -> Self {
        Self { database: client.database(database), client: Some(client) }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database.collection(collection_name)
    }

    async fn run_find(
        &self,
        collection: &str,
        query: Query,
    ) -> DocumentStoreResult<mongodb::Cursor<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(saturating_i64(limit));
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip);
        }
        if !query.sort.is_empty() {
            options.sort = Some(sort_document(&query.sort));
        }

        self.get_collection(collection)
            .find(MongoQueryTranslator::filter(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(backend_error)
    }

    async fn run_aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<mongodb::Cursor<Document>> {
        self.get_collection(collection)
            .aggregate(pipeline_documents(pipeline)?)
            .await
            .map_err(backend_error)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        match self
            .database
            .list_collection_names()
            .filter(doc! { "name": name })
            .await
        {
            Ok(names) => Ok(names.iter().any(|found| found == name)),
            // Listing is rejected inside multi-document transactions; the collection is
            // assumed present.
            Err(err) if command_code(&err).is_some_and(|(_, code_name)| code_name == NOT_SUPPORTED_IN_TRANSACTION) => {
                debug!(collection = name, "collection lookup unsupported in transaction");
                Ok(true)
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        match self.database.create_collection(name).await {
            Ok(()) => Ok(()),
            Err(err) if command_code(&err).is_some_and(|(code, _)| code == NAMESPACE_EXISTS) => Ok(()),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexSpec>,
    ) -> DocumentStoreResult<Vec<String>> {
        Ok(self
            .get_collection(collection)
            .create_indexes(indexes.into_iter().map(index_model))
            .await
            .map_err(backend_error)?
            .index_names)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        let id = document.get("_id").cloned();

        match self.get_collection(collection).insert_one(document).await {
            Ok(result) => Ok(result.inserted_id),
            Err(err) if is_duplicate_key(&err) => Err(DocumentStoreError::DocumentAlreadyExists(
                display_id(id.as_ref()),
                collection.to_string(),
            )),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        if documents.is_empty() {
            return Ok(InsertManyOutcome::default());
        }

        let ids = documents
            .iter()
            .map(|document| document.get("_id").cloned().unwrap_or(Bson::Null))
            .collect::<Vec<_>>();

        let failures = match self
            .get_collection(collection)
            .insert_many(documents)
            .ordered(false)
            .await
        {
            Ok(_) => Vec::new(),
            Err(err) => match err.kind.as_ref() {
                ErrorKind::InsertMany(InsertManyError { write_errors: Some(write_errors), .. }) => {
                    write_errors
                        .iter()
                        .map(|write| WriteFailure { index: write.index, message: write.message.clone() })
                        .collect()
                }
                _ => return Err(backend_error(err)),
            },
        };

        if !failures.is_empty() {
            warn!(collection, failed = failures.len(), "unordered insert rejected documents");
        }

        let rejected = failures.iter().map(|failure| failure.index).collect::<HashSet<_>>();
        let inserted = ids
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !rejected.contains(index))
            .collect();

        Ok(InsertManyOutcome { inserted, failures })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let result = self
            .get_collection(collection)
            .update_one(MongoQueryTranslator::filter(filter.as_ref())?, update.to_document())
            .upsert(upsert)
            .await
            .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let result = self
            .get_collection(collection)
            .update_many(MongoQueryTranslator::filter(filter.as_ref())?, update.to_document())
            .await
            .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn bulk_update(
        &self,
        collection: &str,
        operations: Vec<UpdateOp>,
    ) -> DocumentStoreResult<BulkUpdateOutcome> {
        let mut outcome = BulkUpdateOutcome::default();
        let mut statements = operations
            .into_iter()
            .map(update_statement)
            .collect::<DocumentStoreResult<Vec<_>>>()?;
        let mut offset = 0;

        while !statements.is_empty() {
            let rest = statements.split_off(statements.len().min(UPDATE_BATCH_SIZE));
            let batch = std::mem::replace(&mut statements, rest);
            let size = batch.len();

            let reply = self
                .database
                .run_command(doc! {
                    "update": collection,
                    "updates": batch,
                    "ordered": false,
                })
                .await
                .map_err(backend_error)?;
            merge_update_reply(&mut outcome, &reply, offset)?;

            offset += size;
        }

        if !outcome.failures.is_empty() {
            warn!(collection, failed = outcome.failures.len(), "unordered update rejected documents");
        }

        Ok(outcome)
    }

    async fn delete_one(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_one(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        self.run_find(collection, query)
            .await?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn find_stream(
        &self,
        collection: &str,
        query: Query,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        Ok(self
            .run_find(collection, query)
            .await?
            .map_err(backend_error)
            .boxed())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.run_aggregate(collection, pipeline)
            .await?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn aggregate_stream(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        Ok(self
            .run_aggregate(collection, pipeline)
            .await?
            .map_err(backend_error)
            .boxed())
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<Expr>,
        max_time: Option<Duration>,
    ) -> DocumentStoreResult<u64> {
        let mut options = CountOptions::default();
        options.max_time = max_time;

        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::filter(filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        if let Some(client) = self.client {
            client.shutdown().await;
        }

        Ok(())
    }
}

/// Connects to MongoDB from a connection string.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        )
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        Ok(MongoDbStore::with_client(client, &self.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::query::Filter;

    #[test]
    fn update_statements_target_one_document() {
        let op = UpdateOp::new(Some(Filter::id("k1")), Update::new().with_set("rank", 2)).upsert();

        assert_eq!(
            update_statement(op).unwrap(),
            doc! {
                "q": { "_id": { "$eq": "k1" } },
                "u": { "$set": { "rank": 2 } },
                "upsert": true,
                "multi": false,
            }
        );
    }

    #[test]
    fn replies_report_rejections_and_upserts_by_position() {
        let mut outcome = BulkUpdateOutcome::default();
        let reply = doc! {
            "ok": 1.0,
            "n": 3,
            "nModified": 2,
            "upserted": [{ "index": 2, "_id": "k9" }],
            "writeErrors": [{ "index": 1, "code": 11000, "errmsg": "duplicate key" }],
        };

        merge_update_reply(&mut outcome, &reply, 1000).unwrap();

        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.modified, 2);
        assert_eq!(outcome.upserted, vec![(1002, Bson::String("k9".into()))]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1001);
        assert_eq!(outcome.failures[0].message, "duplicate key");
    }

    #[test]
    fn write_concern_errors_fail_the_batch() {
        let mut outcome = BulkUpdateOutcome::default();
        let reply = doc! { "ok": 1.0, "n": 1, "writeConcernError": { "code": 64, "errmsg": "waiting for replication timed out" } };

        assert!(matches!(
            merge_update_reply(&mut outcome, &reply, 0),
            Err(DocumentStoreError::Backend(message)) if message.contains("replication")
        ));
    }
}
