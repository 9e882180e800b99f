//! Contracts a type must satisfy to be stored and queried through the engine.
//!
//! This module provides:
//!
//! - [`CollectionSpec`] - names the backing collection and its declared indexes
//! - [`Record`] - a persisted document with an identity and an optional audit trail
//! - [`Actor`] - whoever performs a write, recorded in the audit trail
//! - [`AuditEntry`] / [`AuditTrail`] - the append-only change history of a record
//! - [`RecordExt`] - conversions between records and BSON documents

use bson::{Bson, DateTime, Document, de::deserialize_from_document, ser::serialize_to_document};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{error::DocumentStoreResult, query::SortDirection};

/// Field under which the identity of every persisted document is stored.
pub const ID_FIELD: &str = "_id";

/// Field under which the audit trail of a record is persisted.
pub const AUDIT_FIELD: &str = "records";

/// Audit summary written when a record is first saved.
pub const CREATED_SUMMARY: &str = "create";

/// Audit summary written when a record is updated.
pub const UPDATED_SUMMARY: &str = "updated";

/// Declaration of an index the collection of a record should carry.
///
/// # Example
///
/// ```ignore
/// use docmodel::record::IndexSpec;
///
/// let spec = IndexSpec::ascending("email").unique();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// The indexed fields in order.
    pub keys: Vec<(String, SortDirection)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Optional explicit index name.
    pub name: Option<String>,
}

impl IndexSpec {
    /// Creates an empty index declaration.
    pub fn new() -> Self {
        Self { keys: Vec::new(), unique: false, name: None }
    }

    /// Creates a single-field ascending index declaration.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new().key(field, SortDirection::Asc)
    }

    /// Creates a single-field descending index declaration.
    pub fn descending(field: impl Into<String>) -> Self {
        Self::new().key(field, SortDirection::Desc)
    }

    /// Appends a key to this index.
    pub fn key(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    /// Marks this index as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets an explicit index name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// Names the collection a value lives in and the indexes that collection declares.
///
/// This trait is object safe so heterogeneous records can be bootstrapped together
/// through [`Model::ensure_collections`](crate::model::Model::ensure_collections).
pub trait CollectionSpec: Send + Sync {
    /// Returns the name of the collection this value belongs to.
    fn collection_name(&self) -> &str;

    /// Returns the indexes the collection should be created with.
    ///
    /// When empty, the collection is created bare.
    fn index_specs(&self) -> Vec<IndexSpec> {
        Vec::new()
    }
}

/// The author of a write, as recorded in audit entries.
pub trait Actor: Send + Sync {
    /// Returns the account identifier of the actor.
    fn account(&self) -> &str;

    /// Returns the display name of the actor.
    fn name(&self) -> &str;
}

/// A single entry of a record's audit trail.
///
/// Persisted as `{datetime, summary, account, name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub datetime: DateTime,
    pub summary: String,
    pub account: String,
    pub name: String,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(actor: &dyn Actor, summary: impl Into<String>) -> Self {
        Self {
            datetime: DateTime::now(),
            summary: summary.into(),
            account: actor.account().to_string(),
            name: actor.name().to_string(),
        }
    }

    /// Returns the timestamp of this entry as a chrono value.
    pub fn timestamp(&self) -> chrono::DateTime<Utc> {
        self.datetime.to_chrono()
    }
}

/// Append-only audit trail embedded in a record.
///
/// Serializes transparently as an array of [`AuditEntry`] values, so a record can embed it as
/// `#[serde(default)] records: AuditTrail`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail(Vec<AuditEntry>);

impl AuditTrail {
    /// Creates an empty trail.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an entry and returns the whole trail.
    pub fn append(&mut self, actor: &dyn Actor, summary: impl Into<String>) -> &[AuditEntry] {
        self.0.push(AuditEntry::new(actor, summary));
        &self.0
    }

    /// Appends an already built entry.
    pub fn push(&mut self, entry: AuditEntry) {
        self.0.push(entry);
    }

    /// Returns the entries in append order.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.0
    }

    /// Returns the most recent entry.
    pub fn last(&self) -> Option<&AuditEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A document persisted in a collection.
///
/// Implementors are plain serde types. The engine decodes query results directly into the
/// implementing type, so no reflection or registration is needed: the type parameter of each
/// engine call is the concrete type results are materialized into.
///
/// Audit support is opt-in through [`audit_trail_mut`](Record::audit_trail_mut). Records that
/// do not expose a trail turn [`mark_created_by`](Record::mark_created_by) and
/// [`append_audit`](Record::append_audit) into no-ops.
///
/// # Example
///
/// ```ignore
/// use docmodel::record::{AuditTrail, CollectionSpec, Record};
/// use bson::{Bson, oid::ObjectId};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     pub name: String,
///     #[serde(default)]
///     pub records: AuditTrail,
/// }
///
/// impl CollectionSpec for User {
///     fn collection_name(&self) -> &str { "users" }
/// }
///
/// impl Record for User {
///     fn id(&self) -> Option<Bson> { self.id.map(Bson::ObjectId) }
///     fn audit_trail_mut(&mut self) -> Option<&mut AuditTrail> { Some(&mut self.records) }
/// }
/// ```
pub trait Record: CollectionSpec + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the identity of this record, or `None` if it has not been assigned yet.
    fn id(&self) -> Option<Bson>;

    /// Returns the audit trail of this record, if it keeps one.
    fn audit_trail_mut(&mut self) -> Option<&mut AuditTrail> {
        None
    }

    /// Stamps the creation entry on the audit trail.
    fn mark_created_by(&mut self, actor: &dyn Actor) {
        if let Some(trail) = self.audit_trail_mut() {
            trail.append(actor, CREATED_SUMMARY);
        }
    }

    /// Appends an entry to the audit trail and returns the full trail after the append.
    ///
    /// Returns an empty list when the record keeps no trail.
    fn append_audit(&mut self, actor: &dyn Actor, summary: &str) -> Vec<AuditEntry> {
        match self.audit_trail_mut() {
            Some(trail) => trail.append(actor, summary).to_vec(),
            None => Vec::new(),
        }
    }
}

/// Extension trait providing BSON conversions for records.
///
/// Automatically implemented for all types that implement [`Record`].
pub trait RecordExt: Record {
    /// Converts this record to the BSON document that gets persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the record does not serialize to a document.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Decodes a record from a persisted document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the record layout.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(document)?)
    }
}

/// Decodes any serde type from a persisted document.
pub(crate) fn decode<T: DeserializeOwned>(document: Document) -> DocumentStoreResult<T> {
    Ok(deserialize_from_document(document)?)
}

/// Returns a stable string key for an identity, used to correlate ids with decoded rows.
///
/// Keys carry the value's type, so a string never collides with an object id or number.
/// Numbers that compare equal across integer and double representations share a key.
pub(crate) fn id_key(id: &Bson) -> String {
    match id {
        Bson::String(value) => format!("s:{value}"),
        Bson::ObjectId(oid) => format!("o:{}", oid.to_hex()),
        Bson::Int32(n) => format!("n:{n}"),
        Bson::Int64(n) => format!("n:{n}"),
        Bson::Double(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => format!("n:{}", *n as i64),
        Bson::Double(n) => format!("n:{n}"),
        other => format!("{:?}:{other}", other.element_type()),
    }
}
