//! Statement and expression definitions produced by the external SQL parser.
//! The compiler only ever reads these; they are immutable, tree-shaped, and
//! cycle-free.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::fmt;

#[derive(PartialEq, Debug, Clone)]
pub enum Statement {
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

#[derive(PartialEq, Debug, Clone)]
pub struct SelectStatement {
    pub items: Vec<SelectItem>,
    pub from: FromItem,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<String>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByElement>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct UpdateStatement {
    pub table: String,
    pub sets: Vec<SetClause>,
    pub where_clause: Option<Expression>,
}

/// A single `column = value` assignment. `value` of `None` models
/// `column = NULL`, which compiles to a field removal, not a `$set`.
#[derive(PartialEq, Debug, Clone)]
pub struct SetClause {
    pub column: String,
    pub value: Option<Literal>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DeleteStatement {
    pub table: String,
    pub where_clause: Option<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum SelectItem {
    Star,
    Expression {
        expr: Expression,
        alias: Option<String>,
    },
}

#[derive(PartialEq, Debug, Clone)]
pub enum FromItem {
    Table {
        name: String,
        alias: Option<String>,
    },
    Subquery {
        query: Box<SelectStatement>,
        alias: Option<String>,
    },
}

impl FromItem {
    /// The name this from-item is addressable by: its alias when one was
    /// given, the table name otherwise.
    pub fn effective_alias(&self) -> Option<&str> {
        match self {
            FromItem::Table { name, alias } => Some(alias.as_deref().unwrap_or(name)),
            FromItem::Subquery { alias, .. } => alias.as_deref(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub from: FromItem,
    pub on: Option<Expression>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER"),
            JoinKind::Left => write!(f, "LEFT"),
            JoinKind::Right => write!(f, "RIGHT"),
            JoinKind::Full => write!(f, "FULL"),
            JoinKind::Cross => write!(f, "CROSS"),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct OrderByElement {
    pub expr: Expression,
    pub direction: Direction,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Column(String),
    Literal(Literal),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    Like {
        left: Box<Expression>,
        right: Box<Expression>,
        negated: bool,
    },
    In {
        left: Box<Expression>,
        items: Vec<Expression>,
        negated: bool,
    },
    Function {
        name: String,
        args: Vec<Expression>,
    },
    Parenthesis(Box<Expression>),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    Long(i64),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
    Boolean(bool),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl ComparisonOp {
    /// The operator with its operands exchanged, used to pin the column on
    /// the left when a literal appears first.
    pub fn mirrored(self) -> Self {
        match self {
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Gte => ComparisonOp::Lte,
            ComparisonOp::Lte => ComparisonOp::Gte,
            other => other,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonOp::Eq => write!(f, "="),
            ComparisonOp::Ne => write!(f, "!="),
            ComparisonOp::Gt => write!(f, ">"),
            ComparisonOp::Lt => write!(f, "<"),
            ComparisonOp::Gte => write!(f, ">="),
            ComparisonOp::Lte => write!(f, "<="),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
        }
    }
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    pub fn long(value: i64) -> Self {
        Expression::Literal(Literal::Long(value))
    }

    pub fn double(value: f64) -> Self {
        Expression::Literal(Literal::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::Boolean(value))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function {
            name: name.into(),
            args,
        }
    }

    pub fn compare(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn paren(expr: Expression) -> Self {
        Expression::Parenthesis(Box::new(expr))
    }

    /// Strips any number of enclosing `Parenthesis` nodes.
    pub fn unparenthesized(&self) -> &Expression {
        match self {
            Expression::Parenthesis(inner) => inner.unparenthesized(),
            other => other,
        }
    }
}

/// Splits a column reference into its leading qualifier and the remaining
/// field path, if it has one. `t1.nested.field` yields `("t1",
/// "nested.field")`.
pub fn qualifier(column: &str) -> Option<(&str, &str)> {
    column.split_once('.')
}

/// Rebuilds an expression tree with every column name passed through `f`.
/// Used to strip table qualifiers and to rewrite ON-clause columns into
/// `$$var`/`$field` references before compilation.
pub(crate) fn map_columns(expr: &Expression, f: &mut impl FnMut(&str) -> String) -> Expression {
    match expr {
        Expression::Column(c) => Expression::Column(f(c)),
        Expression::Literal(l) => Expression::Literal(l.clone()),
        Expression::Comparison { op, left, right } => Expression::Comparison {
            op: *op,
            left: Box::new(map_columns(left, f)),
            right: Box::new(map_columns(right, f)),
        },
        Expression::Logical { op, left, right } => Expression::Logical {
            op: *op,
            left: Box::new(map_columns(left, f)),
            right: Box::new(map_columns(right, f)),
        },
        Expression::Not(inner) => Expression::Not(Box::new(map_columns(inner, f))),
        Expression::IsNull { expr, negated } => Expression::IsNull {
            expr: Box::new(map_columns(expr, f)),
            negated: *negated,
        },
        Expression::Like {
            left,
            right,
            negated,
        } => Expression::Like {
            left: Box::new(map_columns(left, f)),
            right: Box::new(map_columns(right, f)),
            negated: *negated,
        },
        Expression::In {
            left,
            items,
            negated,
        } => Expression::In {
            left: Box::new(map_columns(left, f)),
            items: items.iter().map(|i| map_columns(i, f)).collect(),
            negated: *negated,
        },
        Expression::Function { name, args } => Expression::Function {
            name: name.clone(),
            args: args.iter().map(|a| map_columns(a, f)).collect(),
        },
        Expression::Parenthesis(inner) => {
            Expression::Parenthesis(Box::new(map_columns(inner, f)))
        }
    }
}

/// Appends every column referenced anywhere in `expr` to `out`, in
/// left-to-right order.
pub(crate) fn collect_columns<'a>(expr: &'a Expression, out: &mut Vec<&'a str>) {
    match expr {
        Expression::Column(c) => out.push(c),
        Expression::Literal(_) => {}
        Expression::Comparison { left, right, .. } | Expression::Logical { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expression::Not(inner) | Expression::Parenthesis(inner) => collect_columns(inner, out),
        Expression::IsNull { expr, .. } => collect_columns(expr, out),
        Expression::Like { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expression::In { left, items, .. } => {
            collect_columns(left, out);
            for item in items {
                collect_columns(item, out);
            }
        }
        Expression::Function { args, .. } => {
            for arg in args {
                collect_columns(arg, out);
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(c) => write!(f, "{}", c),
            Expression::Literal(l) => write!(f, "{}", l),
            Expression::Comparison { op, left, right } => {
                write!(f, "{} {} {}", left, op, right)
            }
            Expression::Logical { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Expression::Not(inner) => write!(f, "NOT {}", inner),
            Expression::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expression::Like {
                left,
                right,
                negated,
            } => write!(
                f,
                "{} {}LIKE {}",
                left,
                if *negated { "NOT " } else { "" },
                right
            ),
            Expression::In {
                left,
                items,
                negated,
            } => write!(
                f,
                "{} {}IN ({})",
                left,
                if *negated { "NOT " } else { "" },
                items.iter().map(|i| i.to_string()).join(", ")
            ),
            Expression::Function { name, args } => write!(
                f,
                "{}({})",
                name,
                args.iter().map(|a| a.to_string()).join(", ")
            ),
            Expression::Parenthesis(inner) => write!(f, "({})", inner),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Long(v) => write!(f, "{}", v),
            Literal::Double(v) => write!(f, "{:?}", v),
            Literal::String(v) => write!(f, "'{}'", v),
            Literal::Date(v) => write!(f, "'{}'", v.to_rfc3339()),
            Literal::Boolean(v) => write!(f, "{}", v),
        }
    }
}
