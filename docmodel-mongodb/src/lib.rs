//! MongoDB backend implementation for docmodel.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait on top of
//! the official async driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Native filters** - Filter expressions translate to MongoDB query documents
//! - **Pipelines** - Stages translate one to one into an aggregation pipeline
//! - **Unordered bulk writes** - Rejected documents are reported by input position
//! - **Bounded counts** - Direct counts honour a server-side max time
//!
//! # Connection
//!
//! Either hand the store a [`mongodb::Database`] whose connection you manage, or let the
//! builder connect from a connection string.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{backend::StoreBackendBuilder, model::Model, mongodb::MongoDbStore};
//!
//! let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!     .build()
//!     .await?;
//! let model = Model::new(store);
//! ```

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
