#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use docmodel::{
    backend::{BulkUpdateOutcome, DocumentStream, InsertManyOutcome, UpdateOutcome},
    bson::{Bson, Document, oid::ObjectId},
    memory::InMemoryStore,
    prelude::*,
    update::UpdateOp,
};
use serde::{Deserialize, Serialize};

pub struct Operator;

impl Actor for Operator {
    fn account(&self) -> &str {
        "ops@example.com"
    }

    fn name(&self) -> &str {
        "Ops"
    }
}

/// An audited record keyed by a caller-chosen string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "_id")]
    pub key: String,
    pub name: String,
    pub rank: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub records: AuditTrail,
}

impl CollectionSpec for Item {
    fn collection_name(&self) -> &str {
        "items"
    }

    fn index_specs(&self) -> Vec<IndexSpec> {
        vec![IndexSpec::ascending("rank")]
    }
}

impl Record for Item {
    fn id(&self) -> Option<Bson> {
        if self.key.is_empty() {
            None
        } else {
            Some(Bson::String(self.key.clone()))
        }
    }

    fn audit_trail_mut(&mut self) -> Option<&mut AuditTrail> {
        Some(&mut self.records)
    }
}

pub fn item(key: &str, name: &str, rank: i32) -> Item {
    Item {
        key: key.to_string(),
        name: name.to_string(),
        rank,
        ..Item::default()
    }
}

/// A record without an audit trail whose identity is assigned on save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub text: String,
}

impl CollectionSpec for Note {
    fn collection_name(&self) -> &str {
        "notes"
    }
}

impl Record for Note {
    fn id(&self) -> Option<Bson> {
        self.id.map(Bson::ObjectId)
    }
}

/// An audited record whose email must be unique across the collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub key: String,
    pub email: String,
    #[serde(default)]
    pub records: AuditTrail,
}

impl CollectionSpec for Account {
    fn collection_name(&self) -> &str {
        "accounts"
    }

    fn index_specs(&self) -> Vec<IndexSpec> {
        vec![IndexSpec::ascending("email").unique()]
    }
}

impl Record for Account {
    fn id(&self) -> Option<Bson> {
        Some(Bson::String(self.key.clone()))
    }

    fn audit_trail_mut(&mut self) -> Option<&mut AuditTrail> {
        Some(&mut self.records)
    }
}

pub fn account(key: &str, email: &str) -> Account {
    Account {
        key: key.to_string(),
        email: email.to_string(),
        ..Account::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub sku: String,
    pub qty: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub key: String,
    pub customer: String,
    pub lines: Vec<Line>,
}

impl CollectionSpec for Order {
    fn collection_name(&self) -> &str {
        "orders"
    }
}

impl Record for Order {
    fn id(&self) -> Option<Bson> {
        Some(Bson::String(self.key.clone()))
    }
}

/// One row per order line, read from the `orders` collection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "_id")]
    pub order: String,
    pub customer: String,
    #[serde(rename = "lines")]
    pub line: Line,
}

impl CollectionSpec for OrderLine {
    fn collection_name(&self) -> &str {
        "orders"
    }
}

impl AggregateSpec for OrderLine {
    fn pipeline(&self, filter: Option<Expr>) -> Pipeline {
        Pipeline::new().matching(filter).unwind("lines")
    }
}

fn order(key: &str, customer: &str, lines: &[(&str, i32)]) -> Order {
    Order {
        key: key.to_string(),
        customer: customer.to_string(),
        lines: lines
            .iter()
            .map(|(sku, qty)| Line { sku: sku.to_string(), qty: *qty })
            .collect(),
    }
}

/// Four orders holding five lines in natural order c, a, b, d, e.
pub async fn seed_orders<B: StoreBackend>(model: &Model<B>) {
    let orders = vec![
        order("o1", "alice", &[("c", 1), ("a", 2)]),
        order("o2", "bob", &[("b", 5)]),
        order("o3", "alice", &[]),
        order("o4", "carol", &[("d", 3), ("e", 4)]),
    ];

    let outcome = model.batch_save(orders, None).await.unwrap();
    assert_eq!(outcome.inserted.len(), 4);
}

/// Saves `n` items keyed `i1..=in` with ranks `1..=n`.
pub async fn seed_items<B: StoreBackend>(model: &Model<B>, n: i32) {
    let items = (1..=n)
        .map(|rank| item(&format!("i{rank}"), &format!("item {rank}"), rank))
        .collect::<Vec<_>>();

    let outcome = model.batch_save(items, Some(&Operator)).await.unwrap();
    assert_eq!(outcome.inserted.len(), n as usize);
}

/// In-memory backend counting bootstrap calls, optionally failing creation of some
/// collections.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryStore,
    failing: HashSet<String>,
    lookups: AtomicUsize,
    creates: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of create-collection and create-index calls.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn creating(&self, name: &str) -> DocumentStoreResult<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(name) {
            return Err(DocumentStoreError::Backend(format!("cannot create {name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for CountingStore {
    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.collection_exists(name).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.creating(name)?;
        self.inner.create_collection(name).await
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexSpec>,
    ) -> DocumentStoreResult<Vec<String>> {
        self.creating(collection)?;
        self.inner.create_indexes(collection, indexes).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        self.inner.insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyOutcome> {
        self.inner.insert_many(collection, documents).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.inner.update_one(collection, filter, update, upsert).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: Update,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.inner.update_many(collection, filter, update).await
    }

    async fn bulk_update(
        &self,
        collection: &str,
        operations: Vec<UpdateOp>,
    ) -> DocumentStoreResult<BulkUpdateOutcome> {
        self.inner.bulk_update(collection, operations).await
    }

    async fn delete_one(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.inner.delete_many(collection, filter).await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        self.inner.find(collection, query).await
    }

    async fn find_stream(
        &self,
        collection: &str,
        query: Query,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        self.inner.find_stream(collection, query).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.inner.aggregate(collection, pipeline).await
    }

    async fn aggregate_stream(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<DocumentStream<'static>> {
        self.inner.aggregate_stream(collection, pipeline).await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<Expr>,
        max_time: Option<Duration>,
    ) -> DocumentStoreResult<u64> {
        self.inner.count_documents(collection, filter, max_time).await
    }
}
