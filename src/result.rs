use crate::types::FieldType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of compilation failures. Compilation is deterministic, so
/// none of these are retryable; every variant carries the offending SQL
/// fragment.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("unsupported SQL construct: {0}")]
    UnsupportedConstruct(String),
    #[error("ambiguous alias: '{0}' resolves to more than one target")]
    AmbiguousAlias(String),
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
    #[error("cannot coerce '{0}' to {1:?}")]
    TypeCoercionFailure(String, FieldType),
}
