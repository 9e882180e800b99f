//! In-memory storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is intended for
//! development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Filter evaluation** - Every filter operator, including dotted field paths
//! - **Update operators** - `$set`, `$unset` and `$push`, with upserts
//! - **Unordered bulk writes** - Itemized failures by input position
//! - **Pipelines** - Match, sort, skip, limit, count, unwind and set stages
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{model::Model, memory::InMemoryStore};
//!
//! let model = Model::new(InMemoryStore::new());
//! model.save(&mut user, None).await?;
//! ```

mod evaluator;
mod pipeline;
pub mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
