//! Interpreter for aggregation pipelines over in-memory documents.

use bson::{Bson, Document};

use docmodel_core::{
    aggregate::{Pipeline, Stage},
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::{
    evaluator::{DocumentEvaluator, compare_documents},
    update::{remove_path, set_path},
};

/// Runs every stage of `pipeline` over `documents` in order.
///
/// Backend-native [`Stage::Raw`] stages cannot be interpreted and fail with
/// [`DocumentStoreError::UnsupportedStage`].
pub(crate) fn run(mut documents: Vec<Document>, pipeline: Pipeline) -> DocumentStoreResult<Vec<Document>> {
    for stage in pipeline {
        documents = apply(documents, stage)?;
    }

    Ok(documents)
}

fn apply(mut documents: Vec<Document>, stage: Stage) -> DocumentStoreResult<Vec<Document>> {
    match stage {
        Stage::Match(expr) => {
            let mut kept = Vec::with_capacity(documents.len());
            for document in documents {
                if DocumentEvaluator::new(&document).evaluate(&expr)? {
                    kept.push(document);
                }
            }
            Ok(kept)
        }
        Stage::Sort(keys) => {
            documents.sort_by(|a, b| compare_documents(a, b, &keys));
            Ok(documents)
        }
        Stage::Skip(n) => Ok(documents.into_iter().skip(n as usize).collect()),
        Stage::Limit(n) => Ok(documents.into_iter().take(n as usize).collect()),
        Stage::Count(field) => {
            if documents.is_empty() {
                return Ok(Vec::new());
            }
            let mut row = Document::new();
            row.insert(field, documents.len() as i64);
            Ok(vec![row])
        }
        Stage::Unwind(field) => Ok(unwind(documents, field.trim_start_matches('$'))),
        Stage::Set(fields) => {
            for document in documents.iter_mut() {
                for (key, value) in fields.iter() {
                    set_path(document, key, value.clone())?;
                }
            }
            Ok(documents)
        }
        Stage::Raw(raw) => Err(DocumentStoreError::UnsupportedStage(
            raw.keys().next().cloned().unwrap_or_else(|| "{}".to_string()),
        )),
    }
}

/// Emits one document per element of the array at `path`.
///
/// Documents where the field is missing, null or an empty array are dropped; non-array
/// values pass through unchanged.
fn unwind(documents: Vec<Document>, path: &str) -> Vec<Document> {
    let mut unwound = Vec::with_capacity(documents.len());

    for mut document in documents {
        match remove_path(&mut document, path) {
            Some(Bson::Array(items)) => {
                for item in items {
                    let mut row = document.clone();
                    if set_path(&mut row, path, item).is_ok() {
                        unwound.push(row);
                    }
                }
            }
            Some(Bson::Null) | None => {}
            Some(other) => {
                if set_path(&mut document, path, other).is_ok() {
                    unwound.push(document);
                }
            }
        }
    }

    unwound
}
