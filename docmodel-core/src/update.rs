//! Descriptions of field-level writes.
//!
//! An [`Update`] combines the three operators the engine issues: `$set`, `$unset` and
//! `$push`. Backends receive it unchanged and apply it server side, so documents touched by
//! a multi-document update never have to be fetched locally.

use bson::{Bson, Document};

use crate::query::Expr;

/// A set/unset/push update applied to every matched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    /// Fields overwritten with the given values.
    pub set: Document,
    /// Fields removed from the document.
    pub unset: Vec<String>,
    /// Values appended to array fields, created when missing.
    pub push: Document,
}

impl Update {
    pub fn new() -> Self {
        Update::default()
    }

    /// Creates an update that sets the given fields.
    pub fn set(fields: Document) -> Self {
        Update { set: fields, ..Update::default() }
    }

    /// Creates an update that removes the given fields.
    pub fn unset<S: AsRef<str>>(fields: impl IntoIterator<Item = S>) -> Self {
        Update {
            unset: fields.into_iter().map(|f| f.as_ref().to_string()).collect(),
            ..Update::default()
        }
    }

    /// Sets one more field.
    pub fn with_set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Appends a value to an array field.
    pub fn with_push(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.push.is_empty()
    }

    /// Renders this update as an operator document (`{"$set": .., "$unset": .., "$push": ..}`).
    pub fn to_document(&self) -> Document {
        let mut update = Document::new();

        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            update.insert(
                "$unset",
                self.unset
                    .iter()
                    .map(|field| (field.clone(), Bson::String(String::new())))
                    .collect::<Document>(),
            );
        }
        if !self.push.is_empty() {
            update.insert("$push", self.push.clone());
        }

        update
    }
}

/// One operation of a bulk update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub filter: Option<Expr>,
    pub update: Update,
    /// Insert a new document when nothing matches.
    pub upsert: bool,
}

impl UpdateOp {
    pub fn new(filter: Option<Expr>, update: Update) -> Self {
        Self { filter, update, upsert: false }
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn renders_only_present_operators() {
        let update = Update::set(doc! { "name": "Bob" }).with_push("records", doc! { "summary": "updated" });

        assert_eq!(
            update.to_document(),
            doc! {
                "$set": { "name": "Bob" },
                "$push": { "records": { "summary": "updated" } },
            }
        );
    }

    #[test]
    fn unset_renders_empty_string_markers() {
        let update = Update::unset(["a", "b"]);

        assert_eq!(update.to_document(), doc! { "$unset": { "a": "", "b": "" } });
        assert!(Update::new().is_empty());
    }
}
