//! Main docmodel crate: generic record access over document databases.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports the core
//! types from `docmodel-core` and provides access to the storage backends.
//!
//! # Features
//!
//! - **One engine for every record type** - Save, update, remove and find any serde type
//!   implementing [`Record`](record::Record), decoding results straight into that type
//! - **Audit trails** - Creation and update entries stamped on records by an actor
//! - **Aggregation** - Pipeline reads mirroring the direct reads
//! - **Pagination** - Count plus formatted pages over queries and pipelines alike
//! - **Partial bulk writes** - Unordered batches report the records that failed
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//! use bson::{Bson, oid::ObjectId};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     #[serde(default)]
//!     pub records: AuditTrail,
//! }
//!
//! impl CollectionSpec for User {
//!     fn collection_name(&self) -> &str { "users" }
//! }
//!
//! impl Record for User {
//!     fn id(&self) -> Option<Bson> { self.id.map(Bson::ObjectId) }
//!     fn audit_trail_mut(&mut self) -> Option<&mut AuditTrail> { Some(&mut self.records) }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let model = Model::new(InMemoryStore::new());
//!
//!     let mut alice = User { name: "Alice".into(), ..User::default() };
//!     let id = model.save(&mut alice, Some(&operator)).await?;
//!
//!     let users = model
//!         .page_find(&User::default(), Some(Filter::starts_with("name", "A")), 20, 1)
//!         .await?;
//!
//!     println!("{id}: {users:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    aggregate, backend, cache, error, model, page, pagination, query, record, source, update,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
