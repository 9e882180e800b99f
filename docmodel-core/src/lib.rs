//! A generic record access layer over document databases.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Record contracts** ([`record`]) - Traits a type implements to be stored, audited and indexed
//! - **Aggregation contracts** ([`aggregate`]) - Pipelines and the types decoded from them
//! - **Store backend abstraction** ([`backend`]) - The database handle the engine runs on
//! - **Query and filtering API** ([`query`]) - Type-safe filter construction and find options
//! - **Write descriptions** ([`update`]) - Set, unset and push updates
//! - **Record engine** ([`model`]) - Generic save, update, remove, find and pipeline operations
//! - **Existence cache** ([`cache`]) - Collections already verified or created
//! - **Pagination** ([`pagination`], [`page`]) - Count plus data over queries and pipelines
//! - **Streaming sources** ([`source`]) - Reusable cursor-driven reads
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::{model::Model, query::Filter, record::{CollectionSpec, Record}};
//! use bson::{Bson, oid::ObjectId};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! impl CollectionSpec for User {
//!     fn collection_name(&self) -> &str { "users" }
//! }
//!
//! impl Record for User {
//!     fn id(&self) -> Option<Bson> { self.id.map(Bson::ObjectId) }
//! }
//!
//! let model = Model::new(backend);
//! let mut alice = User { id: None, name: "Alice".into() };
//! model.save(&mut alice, None).await?;
//!
//! let found = model.find(&User::default(), Some(Filter::eq("name", "Alice"))).await?;
//! ```

pub mod aggregate;
pub mod backend;
pub mod cache;
pub mod error;
pub mod model;
pub mod page;
pub mod pagination;
pub mod query;
pub mod record;
pub mod source;
pub mod update;
