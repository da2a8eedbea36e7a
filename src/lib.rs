//! Translates parsed SQL statements (SELECT/UPDATE/DELETE) into the query
//! and aggregation-pipeline forms understood by MongoDB. The parser that
//! produces the [`ast::Statement`] input and the driver that executes the
//! output are external collaborators; this crate is only the compiler
//! between them.

pub mod ast;
mod expr;
mod join;
pub mod options;
mod pipeline;
mod render;
pub mod result;
mod special;
pub mod types;

pub use options::TranslateOptions;
pub use render::render;
pub use result::{Error, Result};
pub use types::FieldType;

use ast::Statement;
use bson::Document;

/// A compiled statement, in one of two query shapes plus the write forms.
/// Which shape a SELECT takes is decided once per statement: queries with
/// joins, subquery sources, grouping, or aggregates become pipelines,
/// everything else a find.
#[derive(Debug, PartialEq, Clone)]
pub enum Translation {
    Find(FindQuery),
    Aggregate(AggregateQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindQuery {
    pub collection: String,
    pub filter: Document,
    pub projection: Document,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    /// `select count(*)` without grouping becomes a count, not a find.
    pub count_only: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AggregateQuery {
    pub collection: String,
    pub pipeline: Vec<Document>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct UpdateQuery {
    pub collection: String,
    pub filter: Document,
    pub set: Document,
    pub unset: Document,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DeleteQuery {
    pub collection: String,
    pub filter: Document,
}

/// Compiles a parsed statement into its MongoDB translation.
pub fn translate(statement: &Statement, options: &TranslateOptions) -> Result<Translation> {
    match statement {
        Statement::Select(s) => pipeline::translate_select(s, options),
        Statement::Update(u) => pipeline::translate_update(u, options),
        Statement::Delete(d) => pipeline::translate_delete(d, options),
    }
}
