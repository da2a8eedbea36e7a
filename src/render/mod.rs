//! Shell-style textual rendering of a translation: 2-space indentation, one
//! key per line, no trailing commas, document key order preserved. Consumed
//! verbatim by the REPL layer, so the exact text is part of the contract.

use crate::Translation;
use bson::{Bson, Document};
use itertools::Itertools;


pub fn render(translation: &Translation) -> String {
    match translation {
        Translation::Find(q) => {
            let mut out = if q.count_only {
                format!("db.{}.count({})", q.collection, document_string(&q.filter))
            } else {
                format!(
                    "db.{}.find({} , {})",
                    q.collection,
                    document_string(&q.filter),
                    document_string(&q.projection)
                )
            };
            if let Some(sort) = &q.sort {
                out.push_str(&format!(".sort({})", document_string(sort)));
            }
            if let Some(skip) = q.skip {
                out.push_str(&format!(".skip({})", skip));
            }
            if let Some(limit) = q.limit {
                out.push_str(&format!(".limit({})", limit));
            }
            out
        }
        Translation::Aggregate(q) => format!(
            "db.{}.aggregate([{}])",
            q.collection,
            q.pipeline.iter().map(document_string).join(",")
        ),
        Translation::Update(q) => {
            let mut update = Document::new();
            if !q.set.is_empty() {
                update.insert("$set", q.set.clone());
            }
            if !q.unset.is_empty() {
                update.insert("$unset", q.unset.clone());
            }
            format!(
                "db.{}.updateMany({} , {})",
                q.collection,
                document_string(&q.filter),
                document_string(&update)
            )
        }
        Translation::Delete(q) => {
            format!("db.{}.remove({})", q.collection, document_string(&q.filter))
        }
    }
}

fn document_string(document: &Document) -> String {
    let mut out = String::new();
    write_document(&mut out, document, 0);
    out
}

fn write_document(out: &mut String, document: &Document, indent: usize) {
    if document.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    let last = document.len() - 1;
    for (i, (key, value)) in document.iter().enumerate() {
        push_indent(out, indent + 1);
        out.push('"');
        push_escaped(out, key);
        out.push_str("\": ");
        write_value(out, value, indent + 1);
        if i != last {
            out.push(',');
        }
        out.push('\n');
    }
    push_indent(out, indent);
    out.push('}');
}

fn write_array(out: &mut String, values: &[Bson], indent: usize) {
    if values.is_empty() {
        out.push_str("[]");
        return;
    }
    out.push_str("[\n");
    let last = values.len() - 1;
    for (i, value) in values.iter().enumerate() {
        push_indent(out, indent + 1);
        write_value(out, value, indent + 1);
        if i != last {
            out.push(',');
        }
        out.push('\n');
    }
    push_indent(out, indent);
    out.push(']');
}

fn write_value(out: &mut String, value: &Bson, indent: usize) {
    match value {
        Bson::Document(d) => write_document(out, d, indent),
        Bson::Array(a) => write_array(out, a, indent),
        Bson::String(s) => {
            out.push('"');
            push_escaped(out, s);
            out.push('"');
        }
        Bson::Int32(v) => out.push_str(&v.to_string()),
        Bson::Int64(v) => out.push_str(&v.to_string()),
        Bson::Double(v) => out.push_str(&format!("{:?}", v)),
        Bson::Boolean(v) => out.push_str(&v.to_string()),
        Bson::Null => out.push_str("null"),
        Bson::ObjectId(oid) => out.push_str(&format!("ObjectId(\"{}\")", oid.to_hex())),
        Bson::DateTime(dt) => {
            let formatted = dt
                .to_chrono()
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            out.push_str(&format!("ISODate(\"{}\")", formatted));
        }
        Bson::RegularExpression(re) => {
            out.push('/');
            out.push_str(&re.pattern);
            out.push('/');
            out.push_str(&re.options);
        }
        other => out.push_str(&other.to_string()),
    }
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
}
