//! Translation of filters, sort keys and pipeline stages into MongoDB syntax.

use bson::{Bson, Document, doc};

use docmodel_core::{
    aggregate::{Pipeline, Stage},
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor, Sort},
};

/// Translates filter expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` matches every document.
    pub fn filter(filter: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }
}

/// Escapes regex metacharacters so a value matches literally.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn as_array(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        other => Bson::Array(vec![other.clone()]),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // `$not` is only valid per field; `$nor` negates a whole expression.
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": escape(s) },
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": escape(s) } },
                    other => doc! { "$nin": as_array(other) },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", escape(s)) },
                    _ => return Err(DocumentStoreError::InvalidDocument("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", escape(s)) },
                    _ => return Err(DocumentStoreError::InvalidDocument("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": as_array(value) },
                FieldOp::NoneOf => doc! { "$nin": as_array(value) },
            }
        })
    }
}

/// Converts a count to the signed integer the server expects, saturating at `i64::MAX`.
pub(crate) fn saturating_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Renders sort keys as a `{field: 1 | -1}` document.
pub(crate) fn sort_document(keys: &[Sort]) -> Document {
    keys.iter()
        .map(|key| (key.field.clone(), Bson::Int32(key.direction.as_i32())))
        .collect()
}

/// Renders a pipeline as MongoDB stage documents.
pub(crate) fn pipeline_documents(pipeline: Pipeline) -> Result<Vec<Document>, DocumentStoreError> {
    pipeline.into_iter().map(stage_document).collect()
}

fn stage_document(stage: Stage) -> Result<Document, DocumentStoreError> {
    Ok(match stage {
        Stage::Match(expr) => doc! { "$match": MongoQueryTranslator.visit_expr(&expr)? },
        Stage::Sort(keys) => doc! { "$sort": sort_document(&keys) },
        Stage::Skip(n) => doc! { "$skip": saturating_i64(n) },
        Stage::Limit(n) => doc! { "$limit": saturating_i64(n) },
        Stage::Count(field) => doc! { "$count": field },
        Stage::Unwind(field) => {
            let path = if field.starts_with('$') { field } else { format!("${field}") };
            doc! { "$unwind": path }
        }
        Stage::Set(fields) => doc! {
            "$set": fields
                .into_iter()
                .map(|(key, value)| (key, Bson::Document(doc! { "$literal": value })))
                .collect::<Document>(),
        },
        Stage::Raw(raw) => raw,
    })
}
