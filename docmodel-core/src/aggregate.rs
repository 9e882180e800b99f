//! Aggregation pipelines and the contract of types decoded from them.
//!
//! An [`AggregateSpec`] turns a filter into an ordered [`Pipeline`] over its base collection.
//! The engine only ever appends stages to the end of that pipeline (`sort`, `skip`, `limit`
//! or a terminal `count`); it never reorders or interleaves the stages the spec produced.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::aggregate::{AggregateSpec, Pipeline};
//! use docmodel::query::{Expr, Filter};
//! use docmodel::record::CollectionSpec;
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct OrderLine {
//!     order: String,
//!     sku: String,
//! }
//!
//! impl CollectionSpec for OrderLine {
//!     fn collection_name(&self) -> &str { "orders" }
//! }
//!
//! impl AggregateSpec for OrderLine {
//!     fn pipeline(&self, filter: Option<Expr>) -> Pipeline {
//!         Pipeline::new()
//!             .matching(filter)
//!             .unwind("lines")
//!     }
//! }
//! ```

use bson::Document;
use serde::de::DeserializeOwned;

use crate::{
    query::{Expr, Sort},
    record::CollectionSpec,
};

/// Field name of the single row produced by a terminal count stage.
pub const COUNT_FIELD: &str = "count";

/// One stage of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keeps documents matching the expression.
    Match(Expr),
    /// Orders documents by the keys, earlier keys first.
    Sort(Vec<Sort>),
    /// Drops the first `n` documents.
    Skip(u64),
    /// Keeps at most `n` documents.
    Limit(u64),
    /// Replaces the stream with one `{<field>: n}` row; nothing when the stream is empty.
    Count(String),
    /// Emits one document per element of the array field.
    Unwind(String),
    /// Adds or overwrites fields with literal values.
    Set(Document),
    /// A backend-native stage passed through untouched.
    Raw(Document),
}

/// An ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a match stage when a filter is given.
    pub fn matching(self, filter: Option<Expr>) -> Self {
        match filter {
            Some(expr) => self.stage(Stage::Match(expr)),
            None => self,
        }
    }

    /// Appends a sort stage when at least one key is given.
    pub fn sort(self, keys: Vec<Sort>) -> Self {
        if keys.is_empty() {
            self
        } else {
            self.stage(Stage::Sort(keys))
        }
    }

    pub fn skip(self, n: u64) -> Self {
        self.stage(Stage::Skip(n))
    }

    pub fn limit(self, n: u64) -> Self {
        self.stage(Stage::Limit(n))
    }

    pub fn unwind(self, field: impl Into<String>) -> Self {
        self.stage(Stage::Unwind(field.into()))
    }

    /// Appends a terminal count stage writing to [`COUNT_FIELD`].
    pub fn count(self) -> Self {
        self.stage(Stage::Count(COUNT_FIELD.to_string()))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

impl IntoIterator for Pipeline {
    type Item = Stage;
    type IntoIter = std::vec::IntoIter<Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}

/// A row type produced by an aggregation pipeline over a base collection.
///
/// Mirrors [`Record`](crate::record::Record) for reading: the implementing type is the
/// concrete type pipeline results decode into, and its collection name is the pipeline's
/// base collection.
pub trait AggregateSpec: CollectionSpec + DeserializeOwned + Send + Sync + 'static {
    /// Builds the pipeline for the given filter.
    fn pipeline(&self, filter: Option<Expr>) -> Pipeline;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;

    #[test]
    fn appended_stages_keep_their_position() {
        let pipeline = Pipeline::new()
            .matching(Some(Filter::eq("status", "open")))
            .unwind("lines")
            .sort(vec![Sort::desc("total")])
            .skip(10)
            .limit(5);

        assert_eq!(
            pipeline.into_stages(),
            vec![
                Stage::Match(Filter::eq("status", "open")),
                Stage::Unwind("lines".into()),
                Stage::Sort(vec![Sort::desc("total")]),
                Stage::Skip(10),
                Stage::Limit(5),
            ]
        );
    }

    #[test]
    fn empty_inputs_add_no_stage() {
        let pipeline = Pipeline::new().matching(None).sort(Vec::new());

        assert!(pipeline.is_empty());
        assert_eq!(Pipeline::new().count().stages(), &[Stage::Count(COUNT_FIELD.into())]);
    }
}
