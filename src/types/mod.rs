//! Declared field types and literal normalization. When one side of a
//! comparison is a column with a declared type, the literal on the other side
//! is coerced to that type before it lands in the output document.

use crate::{
    ast::Literal,
    result::{Error, Result},
};
use bson::Bson;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
    #[default]
    Unknown,
}

/// Coerces a literal to the given field type. This is the single place where
/// SQL literal text becomes a BSON value.
pub fn normalize(literal: &Literal, field_type: FieldType) -> Result<Bson> {
    match field_type {
        FieldType::String => Ok(Bson::String(unescape_quotes(&raw_string(literal)))),
        FieldType::Number => normalize_number(literal),
        FieldType::Date => normalize_date(literal),
        FieldType::Boolean => normalize_boolean(literal),
        FieldType::Unknown => Ok(normalize_unknown(literal)),
    }
}

// SQL escapes a single quote by doubling it.
fn unescape_quotes(s: &str) -> String {
    s.replace("''", "'")
}

fn raw_string(literal: &Literal) -> String {
    match literal {
        Literal::Long(v) => v.to_string(),
        Literal::Double(v) => format!("{:?}", v),
        Literal::String(v) => v.clone(),
        Literal::Date(v) => v.to_rfc3339(),
        Literal::Boolean(v) => v.to_string(),
    }
}

// Long, then Double, then Float; only when all three fail is the literal
// rejected.
fn normalize_number(literal: &Literal) -> Result<Bson> {
    match literal {
        Literal::Long(v) => Ok(Bson::Int64(*v)),
        Literal::Double(v) => Ok(Bson::Double(*v)),
        Literal::String(s) => {
            if let Ok(v) = s.parse::<i64>() {
                Ok(Bson::Int64(v))
            } else if let Ok(v) = s.parse::<f64>() {
                Ok(Bson::Double(v))
            } else if let Ok(v) = s.parse::<f32>() {
                Ok(Bson::Double(v as f64))
            } else {
                Err(Error::TypeCoercionFailure(s.clone(), FieldType::Number))
            }
        }
        other => Err(Error::TypeCoercionFailure(
            raw_string(other),
            FieldType::Number,
        )),
    }
}

fn normalize_date(literal: &Literal) -> Result<Bson> {
    match literal {
        Literal::Date(v) => Ok(Bson::DateTime(bson::DateTime::from_chrono(*v))),
        Literal::String(s) => parse_date_literal(s).map(Bson::DateTime),
        other => Err(Error::TypeCoercionFailure(
            raw_string(other),
            FieldType::Date,
        )),
    }
}

fn normalize_boolean(literal: &Literal) -> Result<Bson> {
    match literal {
        Literal::Boolean(v) => Ok(Bson::Boolean(*v)),
        Literal::String(s) if s.eq_ignore_ascii_case("true") => Ok(Bson::Boolean(true)),
        Literal::String(s) if s.eq_ignore_ascii_case("false") => Ok(Bson::Boolean(false)),
        other => Err(Error::TypeCoercionFailure(
            raw_string(other),
            FieldType::Boolean,
        )),
    }
}

// With no declared type we only sniff for boolean text; everything else
// passes through unchanged.
fn normalize_unknown(literal: &Literal) -> Bson {
    match literal {
        Literal::Long(v) => Bson::Int64(*v),
        Literal::Double(v) => Bson::Double(*v),
        Literal::String(s) if s.eq_ignore_ascii_case("true") => Bson::Boolean(true),
        Literal::String(s) if s.eq_ignore_ascii_case("false") => Bson::Boolean(false),
        Literal::String(s) => Bson::String(s.clone()),
        Literal::Date(v) => Bson::DateTime(bson::DateTime::from_chrono(*v)),
        Literal::Boolean(v) => Bson::Boolean(*v),
    }
}

/// Parses a date literal by trying, in order: ISO-8601, `yyyy-MM-dd`,
/// `yyyyMMdd`, and finally natural-language parsing.
pub fn parse_date_literal(s: &str) -> Result<bson::DateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(bson::DateTime::from_chrono(dt.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Ok(midnight_utc(d));
        }
    }
    parse_natural_date(s)
}

/// Parses a date literal against an explicit `SimpleDateFormat`-style
/// pattern, in UTC.
pub fn parse_date_with_format(s: &str, format: &str) -> Result<bson::DateTime> {
    let format = date_pattern_to_strftime(format);
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, &format) {
        return Ok(bson::DateTime::from_chrono(Utc.from_utc_datetime(&dt)));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, &format) {
        return Ok(midnight_utc(d));
    }
    Err(Error::InvalidLiteral(format!(
        "date '{}' does not match format '{}'",
        s, format
    )))
}

/// Natural-language fallback, e.g. `'June 12, 2020'`.
pub fn parse_natural_date(s: &str) -> Result<bson::DateTime> {
    dateparser::parse(s)
        .map(bson::DateTime::from_chrono)
        .map_err(|_| Error::InvalidLiteral(format!("unable to parse date '{}'", s)))
}

fn midnight_utc(d: NaiveDate) -> bson::DateTime {
    let dt = Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap());
    bson::DateTime::from_chrono(dt)
}

// Date formats arrive in SimpleDateFormat notation (`yyyy-MM-dd`); chrono
// wants strftime. Longest tokens first so `yyyy` is not consumed as two
// `yy`s.
fn date_pattern_to_strftime(pattern: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("SSS", "%3f"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(stripped) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = stripped;
                continue 'outer;
            }
        }
        let ch = rest.chars().next().unwrap();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}
