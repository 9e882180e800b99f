//! Error types and result types for record access operations.
//!
//! This module provides error handling for every engine and backend operation.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! Partial failures of bulk writes are not errors: they are reported through
//! [`BatchSaveOutcome`](crate::model::BatchSaveOutcome) and
//! [`BatchUpdateOutcome`](crate::model::BatchUpdateOutcome). Only failures of the whole
//! request surface as `Err`.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when accessing records.
///
/// The variants map onto four families:
///
/// - programmer misuse ([`Usage`](DocumentStoreError::Usage)), which fails fast
/// - zero matches for a single-document lookup ([`NotFound`](DocumentStoreError::NotFound))
/// - data problems (serialization, invalid documents, duplicates)
/// - driver failures ([`Backend`](DocumentStoreError::Backend)), propagated without retry
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The engine was used incorrectly, e.g. a record without an identity was addressed by id.
    #[error("Usage error: {0}")]
    Usage(String),
    /// No document matched a single-document lookup in the given collection.
    #[error("No document matched in collection {0}")]
    NotFound(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The document violates schema constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The backend cannot execute a pipeline stage.
    #[error("Unsupported pipeline stage: {0}")]
    UnsupportedStage(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// A streaming callback stopped the iteration.
    #[error("Aborted: {0}")]
    Aborted(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DocumentStoreError {
    /// Returns `true` if this error reports zero matches for a single-document lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NotFound(_))
    }

    /// Returns `true` if this error reports a misuse of the engine.
    pub fn is_usage(&self) -> bool {
        matches!(self, DocumentStoreError::Usage(_))
    }
}

/// A specialized `Result` type for record access operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
