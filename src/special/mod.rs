//! Recognizers for function-call shapes that carry special meaning:
//! `regexMatch`/`notRegexMatch`, `date`, and `objectid`. Each recognizer
//! returns `Ok(None)` when the node is not its shape, so callers can probe
//! them in sequence before falling back to generic compilation.

use crate::{
    ast::{ComparisonOp, Expression, Literal},
    result::{Error, Result},
    types,
};
use bson::oid::ObjectId;
use regex::Regex;

#[cfg(test)]
mod test;

#[derive(Debug, PartialEq, Clone)]
pub struct RegexFunction {
    pub column: String,
    pub pattern: String,
    pub options: Option<String>,
    pub negated: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DateFunction {
    pub column: String,
    pub date: bson::DateTime,
    pub op: ComparisonOp,
}

/// `objectid(column)` matched against one or more raw hex values.
#[derive(Debug, PartialEq, Clone)]
pub struct ObjectIdFunction {
    pub column: String,
    pub values: Vec<ObjectId>,
    pub negated: bool,
}

/// Matches `regexMatch(column, 'pattern' [, 'options'])` and its negated
/// counterpart. The pattern must compile; options together with negation are
/// rejected.
pub fn regex_function(expr: &Expression) -> Result<Option<RegexFunction>> {
    let Expression::Function { name, args } = expr else {
        return Ok(None);
    };
    let negated = if name.eq_ignore_ascii_case("regexMatch") {
        false
    } else if name.eq_ignore_ascii_case("notRegexMatch") {
        true
    } else {
        return Ok(None);
    };
    if args.len() < 2 || args.len() > 3 {
        return Err(Error::UnsupportedConstruct(format!(
            "{} expects 2 or 3 arguments: {}",
            name, expr
        )));
    }
    let column = match args[0].unparenthesized() {
        Expression::Column(c) => c.clone(),
        other => {
            return Err(Error::UnsupportedConstruct(format!(
                "first argument to {} must be a column: {}",
                name, other
            )))
        }
    };
    let pattern = match args[1].unparenthesized() {
        Expression::Literal(Literal::String(s)) => s.clone(),
        other => {
            return Err(Error::UnsupportedConstruct(format!(
                "regex pattern must be a string literal: {}",
                other
            )))
        }
    };
    Regex::new(&pattern)
        .map_err(|e| Error::InvalidLiteral(format!("invalid regex '{}': {}", pattern, e)))?;
    let options = match args.get(2).map(Expression::unparenthesized) {
        None => None,
        Some(Expression::Literal(Literal::String(s))) => Some(s.clone()),
        Some(other) => {
            return Err(Error::UnsupportedConstruct(format!(
                "regex options must be a string literal: {}",
                other
            )))
        }
    };
    if negated && options.is_some() {
        return Err(Error::UnsupportedConstruct(format!(
            "regex options cannot be combined with {}: {}",
            name, expr
        )));
    }
    Ok(Some(RegexFunction {
        column,
        pattern,
        options,
        negated,
    }))
}

/// Matches a comparison whose left operand is `date(column, format)` and
/// whose right operand is a date string. The format `'natural'` selects
/// natural-language parsing; anything else is an explicit pattern, parsed in
/// UTC. Equality is not representable through this path.
pub fn date_function(
    op: ComparisonOp,
    left: &Expression,
    right: &Expression,
) -> Result<Option<DateFunction>> {
    let Expression::Function { name, args } = left.unparenthesized() else {
        return Ok(None);
    };
    if !name.eq_ignore_ascii_case("date") {
        return Ok(None);
    }
    let (column, format) = match args.as_slice() {
        [Expression::Column(c), Expression::Literal(Literal::String(f))] => (c.clone(), f),
        _ => {
            return Err(Error::UnsupportedConstruct(format!(
                "date expects a column and a format string: {}",
                left
            )))
        }
    };
    let value = match right.unparenthesized() {
        Expression::Literal(Literal::String(s)) => s,
        other => {
            return Err(Error::UnsupportedConstruct(format!(
                "date() must be compared against a string literal: {}",
                other
            )))
        }
    };
    if matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
        return Err(Error::UnsupportedConstruct(format!(
            "date() only supports >, >=, < and <=: {} {} {}",
            left, op, right
        )));
    }
    let date = if format == "natural" {
        types::parse_natural_date(value)?
    } else {
        types::parse_date_with_format(value, format)?
    };
    Ok(Some(DateFunction { column, date, op }))
}

/// Matches a comparison where one operand is `objectid(column)` and the
/// other a hex string literal. Only `=` and `!=` are representable; the
/// list forms go through [`object_id_in_list`].
pub fn object_id_comparison(
    op: ComparisonOp,
    left: &Expression,
    right: &Expression,
) -> Result<Option<ObjectIdFunction>> {
    let (column, other) = if let Some(c) = object_id_column(left)? {
        (c, right)
    } else if let Some(c) = object_id_column(right)? {
        (c, left)
    } else {
        return Ok(None);
    };
    let negated = match op {
        ComparisonOp::Eq => false,
        ComparisonOp::Ne => true,
        _ => {
            return Err(Error::UnsupportedConstruct(format!(
                "objectid() only supports =, != and IN: {} {} {}",
                left, op, right
            )))
        }
    };
    let value = match other.unparenthesized() {
        Expression::Literal(Literal::String(s)) => parse_object_id(s)?,
        other => {
            return Err(Error::UnsupportedConstruct(format!(
                "objectid() must be compared against a string literal: {}",
                other
            )))
        }
    };
    Ok(Some(ObjectIdFunction {
        column,
        values: vec![value],
        negated,
    }))
}

/// Matches `objectid(column) IN ('hex', ...)` and its negation, parsing
/// every list element as a raw hex value.
pub fn object_id_in_list(
    left: &Expression,
    items: &[Expression],
    negated: bool,
) -> Result<Option<ObjectIdFunction>> {
    let Some(column) = object_id_column(left)? else {
        return Ok(None);
    };
    let values = items
        .iter()
        .map(|item| match item.unparenthesized() {
            Expression::Literal(Literal::String(s)) => parse_object_id(s),
            other => Err(Error::UnsupportedConstruct(format!(
                "objectid() IN lists take string literals: {}",
                other
            ))),
        })
        .collect::<Result<Vec<ObjectId>>>()?;
    Ok(Some(ObjectIdFunction {
        column,
        values,
        negated,
    }))
}

// The wrapped column may be written bare or as a string literal naming it.
fn object_id_column(expr: &Expression) -> Result<Option<String>> {
    let Expression::Function { name, args } = expr.unparenthesized() else {
        return Ok(None);
    };
    if !name.eq_ignore_ascii_case("objectid") {
        return Ok(None);
    }
    match args.as_slice() {
        [Expression::Column(c)] => Ok(Some(c.clone())),
        [Expression::Literal(Literal::String(c))] => Ok(Some(c.clone())),
        _ => Err(Error::UnsupportedConstruct(format!(
            "objectid expects the column as its one argument: {}",
            expr
        ))),
    }
}

fn parse_object_id(s: &str) -> Result<ObjectId> {
    ObjectId::parse_str(s).map_err(|_| Error::InvalidLiteral(format!("invalid ObjectId '{}'", s)))
}
