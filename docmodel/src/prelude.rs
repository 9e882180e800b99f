//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use docmodel_core::{
    aggregate::{AggregateSpec, Pipeline, Stage},
    backend::{StoreBackend, StoreBackendBuilder},
    cache::CollectionCache,
    error::{DocumentStoreError, DocumentStoreResult},
    model::{BatchSaveOutcome, BatchUpdateOutcome, Bootstrap, Model, ModelBuilder, ModelConfig},
    page::{Page, PageRequest},
    pagination::{PaginationSource, Row, RowFormatter},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    record::{Actor, AuditEntry, AuditTrail, CollectionSpec, IndexSpec, Record, RecordExt},
    source::DataSource,
    update::Update,
};
