//! Update operators applied to in-memory documents.

use bson::{Bson, Document};

use docmodel_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp},
    update::Update,
};

const ID_FIELD: &str = "_id";

/// Writes `value` at a dotted path, creating intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DocumentStoreError::InvalidDocument(format!(
                    "field {head} is not a document"
                ))),
            }
        }
    }
}

/// Removes and returns the value at a dotted path.
pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => remove_path(inner, rest),
            _ => None,
        },
    }
}

fn get_path_mut<'d>(document: &'d mut Document, path: &str) -> Option<&'d mut Bson> {
    match path.split_once('.') {
        None => document.get_mut(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => get_path_mut(inner, rest),
            _ => None,
        },
    }
}

/// Applies `$set`, then `$unset`, then `$push` to a document.
///
/// # Errors
///
/// Fails with [`DocumentStoreError::InvalidDocument`] when the update would change `_id`
/// or push onto a field that is not an array.
pub(crate) fn apply_update(document: &mut Document, update: &Update) -> DocumentStoreResult<()> {
    for (field, value) in update.set.iter() {
        if field == ID_FIELD && document.get(ID_FIELD).is_some_and(|id| id != value) {
            return Err(DocumentStoreError::InvalidDocument(
                "update would modify the immutable field _id".to_string(),
            ));
        }
        set_path(document, field, value.clone())?;
    }

    for field in &update.unset {
        remove_path(document, field);
    }

    for (field, value) in update.push.iter() {
        match get_path_mut(document, field) {
            Some(Bson::Array(items)) => items.push(value.clone()),
            Some(_) => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "cannot push to non-array field {field}"
                )));
            }
            None => set_path(document, field, Bson::Array(vec![value.clone()]))?,
        }
    }

    Ok(())
}

/// Builds the initial document of an upsert from the equality terms of its filter.
pub(crate) fn seed_from_filter(filter: Option<&Expr>) -> Document {
    let mut seed = Document::new();
    if let Some(expr) = filter {
        collect_equalities(expr, &mut seed);
    }
    seed
}

fn collect_equalities(expr: &Expr, seed: &mut Document) {
    match expr {
        Expr::Field { field, op: FieldOp::Eq, value } => {
            // Conflicting paths leave the seed without that term.
            let _ = set_path(seed, field, value.clone());
        }
        Expr::And(exprs) => {
            for expr in exprs {
                collect_equalities(expr, seed);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::Filter;

    #[test]
    fn set_unset_and_push_apply_in_place() {
        let mut document = doc! { "_id": 1, "name": "a", "old": true, "records": [1] };
        let update = Update::set(doc! { "name": "b", "address.city": "Oslo" })
            .with_push("records", 2);
        let update = Update { unset: vec!["old".into()], ..update };

        apply_update(&mut document, &update).unwrap();

        assert_eq!(
            document,
            doc! { "_id": 1, "name": "b", "records": [1, 2], "address": { "city": "Oslo" } }
        );
    }

    #[test]
    fn push_creates_missing_arrays() {
        let mut document = doc! { "_id": 1 };

        apply_update(&mut document, &Update::new().with_push("records", "x")).unwrap();

        assert_eq!(document.get_array("records").unwrap().len(), 1);
    }

    #[test]
    fn identity_cannot_change() {
        let mut document = doc! { "_id": 1 };

        assert!(apply_update(&mut document, &Update::set(doc! { "_id": 2 })).is_err());
        assert!(apply_update(&mut document, &Update::set(doc! { "_id": 1 })).is_ok());
    }

    #[test]
    fn upsert_seed_takes_equalities() {
        let filter = Filter::and([Filter::id("k1"), Filter::eq("kind", "a"), Filter::gt("n", 1)]);

        assert_eq!(seed_from_filter(Some(&filter)), doc! { "_id": "k1", "kind": "a" });
    }
}
