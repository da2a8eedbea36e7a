//! The recursive expression compiler. A boolean expression node becomes a
//! filter document or, when the surrounding query requires multistep
//! aggregation, an `$expr` aggregation-expression document.

use crate::{
    ast::{ComparisonOp, Expression, Literal, LogicalOp},
    options::TranslateOptions,
    pipeline::AliasHolder,
    result::{Error, Result},
    special::{self, ObjectIdFunction, RegexFunction},
    types,
};
use bson::{doc, Bson, Document};
use lazy_static::lazy_static;
use std::collections::BTreeMap;

#[cfg(test)]
mod test;

lazy_static! {
    // SQL names that map to differently-named aggregation operators.
    static ref FUNCTION_ALIASES: BTreeMap<&'static str, &'static str> = vec![
        ("upper", "toUpper"),
        ("lower", "toLower"),
        ("substring", "substrCP"),
        ("ifnull", "ifNull"),
        ("ceiling", "ceil"),
    ]
    .into_iter()
    .collect();
}

const AGGREGATE_FUNCTIONS: &[&str] = &["avg", "count", "max", "min", "sum"];

pub(crate) fn is_aggregate(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(&name.to_lowercase().as_str())
}

/// The field name an aggregate lands under when the SELECT list gives it no
/// alias: the bare function name for `count` or a `*` argument, otherwise
/// `function_argument` with dots flattened to underscores.
pub(crate) fn aggregate_field_name(name: &str, args: &[Expression]) -> String {
    let lower = name.to_lowercase();
    if lower == "count" {
        return lower;
    }
    match args.first().map(Expression::unparenthesized) {
        Some(Expression::Column(c)) if c != "*" => format!("{}_{}", lower, c.replace('.', "_")),
        _ => lower,
    }
}

fn mongo_op(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Eq => "$eq",
        ComparisonOp::Ne => "$ne",
        ComparisonOp::Gt => "$gt",
        ComparisonOp::Lt => "$lt",
        ComparisonOp::Gte => "$gte",
        ComparisonOp::Lte => "$lte",
    }
}

fn in_op(negated: bool) -> &'static str {
    if negated {
        "$nin"
    } else {
        "$in"
    }
}

/// Collects the operands of a same-operator chain into one flat list,
/// left-to-right. A `Parenthesis` node breaks the spine, so explicitly
/// grouped sub-chains stay nested.
pub(crate) fn flatten_logical<'e>(
    op: LogicalOp,
    expr: &'e Expression,
    out: &mut Vec<&'e Expression>,
) {
    match expr {
        Expression::Logical {
            op: o,
            left,
            right,
        } if *o == op => {
            flatten_logical(op, left, out);
            flatten_logical(op, right, out);
        }
        other => out.push(other),
    }
}

pub(crate) struct ExprCompiler<'a> {
    options: &'a TranslateOptions,
    /// The surrounding query requires multistep aggregation; comparisons
    /// between two fields or involving functions wrap in `$expr`.
    aggregation: bool,
    /// ON-clause mode: column names arrive pre-rewritten as `$$var`/`$field`
    /// references and every comparison compiles to an operand array. The
    /// caller wraps the result in a single `$expr`.
    on_clause: bool,
    /// HAVING mode: aggregate function calls resolve to their projected
    /// field names instead of being compiled as operators.
    aliases: Option<&'a AliasHolder>,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(options: &'a TranslateOptions, aggregation: bool) -> Self {
        ExprCompiler {
            options,
            aggregation,
            on_clause: false,
            aliases: None,
        }
    }

    pub fn for_on_clause(options: &'a TranslateOptions) -> Self {
        ExprCompiler {
            options,
            aggregation: true,
            on_clause: true,
            aliases: None,
        }
    }

    pub fn for_having(options: &'a TranslateOptions, aliases: &'a AliasHolder) -> Self {
        ExprCompiler {
            options,
            aggregation: true,
            on_clause: false,
            aliases: Some(aliases),
        }
    }

    /// Compiles a boolean expression into a filter document.
    pub fn compile(&self, expr: &Expression) -> Result<Document> {
        match expr {
            Expression::Parenthesis(inner) => self.compile(inner),
            Expression::Comparison { op, left, right } => {
                self.compile_comparison(*op, left, right)
            }
            Expression::Logical { op, .. } => {
                let mut operands = Vec::new();
                flatten_logical(*op, expr, &mut operands);
                let compiled = operands
                    .iter()
                    .map(|o| self.compile(o).map(Bson::Document))
                    .collect::<Result<Vec<Bson>>>()?;
                Ok(match op {
                    LogicalOp::And => doc! {"$and": compiled},
                    LogicalOp::Or => doc! {"$or": compiled},
                })
            }
            Expression::Not(inner) => self.compile_not(inner),
            Expression::IsNull { expr, negated } => match expr.unparenthesized() {
                Expression::Column(c) if !self.on_clause => {
                    Ok(doc! {c.as_str(): {"$exists": *negated}})
                }
                other => Err(Error::UnsupportedConstruct(format!(
                    "IS NULL requires a column: {}",
                    other
                ))),
            },
            Expression::Like {
                left,
                right,
                negated,
            } => {
                if self.on_clause {
                    return Err(Error::UnsupportedConstruct(format!(
                        "LIKE is not supported in an ON clause: {}",
                        expr
                    )));
                }
                self.compile_like(left, right, *negated)
            }
            Expression::In {
                left,
                items,
                negated,
            } => self.compile_in(left, items, *negated),
            Expression::Function { .. } => {
                if let Some(rf) = special::regex_function(expr)? {
                    return Ok(regex_doc(rf));
                }
                match self.compile_operand(expr, None)? {
                    Bson::Document(d) => Ok(d),
                    _ => Err(Error::UnsupportedConstruct(format!(
                        "cannot use {} as a condition",
                        expr
                    ))),
                }
            }
            Expression::Column(c) if !self.on_clause => Ok(doc! {c.as_str(): true}),
            other => Err(Error::UnsupportedConstruct(format!(
                "cannot use {} as a condition",
                other
            ))),
        }
    }

    fn compile_not(&self, inner: &Expression) -> Result<Document> {
        match inner {
            // NOT (...) negates the whole parenthesized condition.
            Expression::Parenthesis(e) => Ok(doc! {"$nor": [self.compile(e)?]}),
            // NOT on a bare boolean column.
            Expression::Column(c) => Ok(doc! {c.as_str(): {"$ne": true}}),
            Expression::Comparison { op, left, right } => {
                let compiled = self.compile_comparison(*op, left, right)?;
                let mut entries = compiled.iter();
                if let (Some((key, value)), None) = (entries.next(), entries.next()) {
                    if !key.starts_with('$') {
                        return Ok(doc! {key: {"$not": value.clone()}});
                    }
                }
                Ok(doc! {"$nor": [compiled]})
            }
            other => Ok(doc! {"$nor": [self.compile(other)?]}),
        }
    }

    fn compile_comparison(
        &self,
        op: ComparisonOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Document> {
        if !self.on_clause {
            if let Some(df) = special::date_function(op, left, right)? {
                return Ok(doc! {df.column: { mongo_op(df.op): df.date }});
            }
            if let Some(f) = special::object_id_comparison(op, left, right)? {
                return Ok(object_id_filter(f));
            }
        }

        let (l, r) = (left.unparenthesized(), right.unparenthesized());

        if self.on_clause {
            return Ok(doc! {
                mongo_op(op): [
                    self.compile_operand(l, Some(r))?,
                    self.compile_operand(r, Some(l))?,
                ]
            });
        }

        match (l, r) {
            (Expression::Column(lc), Expression::Column(rc)) => Ok(if self.aggregation {
                doc! {"$expr": { mongo_op(op): [format!("${}", lc), format!("${}", rc)] }}
            } else if op == ComparisonOp::Eq {
                doc! {lc.as_str(): rc.as_str()}
            } else {
                doc! {lc.as_str(): { mongo_op(op): rc.as_str() }}
            }),
            _ if matches!(l, Expression::Function { .. })
                || matches!(r, Expression::Function { .. }) =>
            {
                let inner = doc! {
                    mongo_op(op): [
                        self.compile_operand(l, Some(r))?,
                        self.compile_operand(r, Some(l))?,
                    ]
                };
                Ok(if self.aggregation {
                    doc! {"$expr": inner}
                } else {
                    inner
                })
            }
            (Expression::Column(c), Expression::Literal(lit)) => {
                let value = types::normalize(lit, self.options.field_type(c))?;
                Ok(if op == ComparisonOp::Eq {
                    doc! {c.as_str(): value}
                } else {
                    doc! {c.as_str(): { mongo_op(op): value }}
                })
            }
            (Expression::Literal(_), Expression::Column(_)) => {
                self.compile_comparison(op.mirrored(), right, left)
            }
            _ => Err(Error::UnsupportedConstruct(format!(
                "unsupported comparison: {} {} {}",
                left, op, right
            ))),
        }
    }

    /// Compiles an expression in value position: the side of a comparison,
    /// a function argument, or an element of an `$expr` operand array.
    fn compile_operand(&self, expr: &Expression, other: Option<&Expression>) -> Result<Bson> {
        let e = expr.unparenthesized();
        match e {
            Expression::Column(c) => Ok(Bson::String(self.column_ref(c))),
            Expression::Literal(lit) => {
                let field_type = match other.map(Expression::unparenthesized) {
                    Some(Expression::Column(c)) => {
                        self.options.field_type(c.trim_start_matches('$'))
                    }
                    _ => self.options.default_field_type,
                };
                types::normalize(lit, field_type)
            }
            Expression::Function { .. } => self.compile_function(e),
            Expression::Comparison { op, left, right } => Ok(Bson::Document(doc! {
                mongo_op(*op): [
                    self.compile_operand(left, Some(right))?,
                    self.compile_operand(right, Some(left))?,
                ]
            })),
            Expression::Logical { op, .. } => {
                let mut operands = Vec::new();
                flatten_logical(*op, e, &mut operands);
                let compiled = operands
                    .iter()
                    .map(|o| self.compile_operand(o, None))
                    .collect::<Result<Vec<Bson>>>()?;
                Ok(Bson::Document(match op {
                    LogicalOp::And => doc! {"$and": compiled},
                    LogicalOp::Or => doc! {"$or": compiled},
                }))
            }
            Expression::Not(inner) => Ok(Bson::Document(
                doc! {"$not": [self.compile_operand(inner, None)?]},
            )),
            other => Err(Error::UnsupportedConstruct(format!(
                "cannot use {} as a value",
                other
            ))),
        }
    }

    fn compile_function(&self, expr: &Expression) -> Result<Bson> {
        let Expression::Function { name, args } = expr else {
            unreachable!("compile_function called on a non-function node");
        };
        if let Some(aliases) = self.aliases {
            if is_aggregate(name) {
                let resolved = match aliases.alias_for(&expr.to_string()) {
                    Some(alias) => alias.to_string(),
                    None => aggregate_field_name(name, args),
                };
                return Ok(Bson::String(format!("${}", resolved)));
            }
        }
        if name.eq_ignore_ascii_case("objectid") {
            return Err(Error::UnsupportedConstruct(format!(
                "objectid() must wrap the column side of a comparison: {}",
                expr
            )));
        }
        if name.eq_ignore_ascii_case("date") {
            return Err(Error::UnsupportedConstruct(format!(
                "date() must be the left side of a comparison: {}",
                expr
            )));
        }
        if name.eq_ignore_ascii_case("regexMatch") || name.eq_ignore_ascii_case("notRegexMatch") {
            return Err(Error::UnsupportedConstruct(format!(
                "{} cannot be used as a value",
                expr
            )));
        }
        let lower = name.to_lowercase();
        let translated = FUNCTION_ALIASES
            .get(lower.as_str())
            .copied()
            .unwrap_or(name.as_str());
        let value = if args.len() == 1 {
            self.compile_operand(&args[0], None)?
        } else {
            Bson::Array(
                args.iter()
                    .map(|a| self.compile_operand(a, None))
                    .collect::<Result<Vec<Bson>>>()?,
            )
        };
        Ok(Bson::Document(doc! {format!("${}", translated): value}))
    }

    fn compile_like(
        &self,
        left: &Expression,
        right: &Expression,
        negated: bool,
    ) -> Result<Document> {
        let Expression::Column(column) = left.unparenthesized() else {
            return Err(Error::UnsupportedConstruct(format!(
                "left side of LIKE must be a column: {}",
                left
            )));
        };
        let source = match right.unparenthesized() {
            Expression::Literal(Literal::String(s)) => s.clone(),
            Expression::Column(c) => c.clone(),
            other => {
                return Err(Error::UnsupportedConstruct(format!(
                    "LIKE pattern must be a string literal or column: {}",
                    other
                )))
            }
        };
        let pattern = like_to_regex(&source);
        Ok(if negated {
            doc! {column.as_str(): {"$not": Bson::RegularExpression(bson::Regex {
                pattern,
                options: String::new(),
            })}}
        } else {
            doc! {column.as_str(): {"$regex": pattern}}
        })
    }

    fn compile_in(
        &self,
        left: &Expression,
        items: &[Expression],
        negated: bool,
    ) -> Result<Document> {
        let l = left.unparenthesized();
        if !self.on_clause {
            if let Some(f) = special::object_id_in_list(l, items, negated)? {
                return Ok(object_id_filter(f));
            }
        }
        let list = Bson::Array(
            items
                .iter()
                .map(|item| self.compile_in_item(item, l))
                .collect::<Result<Vec<Bson>>>()?,
        );
        match l {
            Expression::Column(c) => {
                if self.on_clause {
                    Ok(doc! { in_op(negated): [Bson::String(self.column_ref(c)), list] })
                } else if self.aggregation {
                    Ok(doc! {"$expr": { in_op(negated): [format!("${}", c), list] }})
                } else {
                    Ok(doc! {c.as_str(): { in_op(negated): list }})
                }
            }
            Expression::Function { name, .. } => {
                if self.aliases.is_some() && is_aggregate(name) {
                    let resolved = self.compile_operand(l, None)?;
                    return Ok(doc! {"$expr": { in_op(negated): [resolved, list] }});
                }
                // Deferred-resolution marker for function-valued IN lists.
                let marker = if negated { "$fnin" } else { "$fin" };
                Ok(doc! {marker: {
                    "function": self.compile_operand(l, None)?,
                    "list": list,
                }})
            }
            other => Err(Error::UnsupportedConstruct(format!(
                "left side of IN must be a column or function: {}",
                other
            ))),
        }
    }

    fn compile_in_item(&self, item: &Expression, left: &Expression) -> Result<Bson> {
        let it = item.unparenthesized();
        match it {
            Expression::Literal(lit) => {
                let field_type = match left {
                    Expression::Column(c) => self.options.field_type(c.trim_start_matches('$')),
                    _ => self.options.default_field_type,
                };
                types::normalize(lit, field_type)
            }
            Expression::Column(c) => Ok(Bson::String(if self.aggregation {
                self.column_ref(c)
            } else {
                c.clone()
            })),
            Expression::Function { .. } => self.compile_operand(it, None),
            other => Err(Error::UnsupportedConstruct(format!(
                "unsupported IN list element: {}",
                other
            ))),
        }
    }

    fn column_ref(&self, name: &str) -> String {
        if self.on_clause {
            // ON-clause columns were already rewritten to $$var / $field.
            name.to_string()
        } else {
            format!("${}", name)
        }
    }
}

// A single raw value keys directly (or under $ne); lists key under $in/$nin.
fn object_id_filter(f: ObjectIdFunction) -> Document {
    let ObjectIdFunction {
        column,
        mut values,
        negated,
    } = f;
    if values.len() == 1 {
        let value = values.remove(0);
        if negated {
            doc! {column: {"$ne": value}}
        } else {
            doc! {column: value}
        }
    } else {
        doc! {column: { in_op(negated): values }}
    }
}

fn regex_doc(rf: RegexFunction) -> Document {
    if rf.negated {
        doc! {rf.column: {"$not": Bson::RegularExpression(bson::Regex {
            pattern: rf.pattern,
            options: String::new(),
        })}}
    } else if let Some(options) = rf.options {
        doc! {rf.column: {"$regex": rf.pattern, "$options": options}}
    } else {
        doc! {rf.column: {"$regex": rf.pattern}}
    }
}

/// Translates SQL LIKE wildcards into an anchored regular expression:
/// `%` matches any run, `_` a single character, and a bracketed range keeps
/// its class with an explicit `{1}` quantifier.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '[' => {
                out.push('[');
                for r in chars.by_ref() {
                    out.push(r);
                    if r == ']' {
                        break;
                    }
                }
                out.push_str("{1}");
            }
            other => out.push(other),
        }
    }
    out.push('$');
    out
}
