//! Assembles compiled pieces into the final output: either a find-style
//! filter + projection, or an ordered aggregation stage list. Subqueries in
//! the FROM position compile recursively and splice in as leading stages.

use crate::{
    ast::{
        self, DeleteStatement, Direction, Expression, FromItem, LogicalOp, SelectItem,
        SelectStatement, UpdateStatement,
    },
    expr::{self, ExprCompiler},
    join,
    options::TranslateOptions,
    result::{Error, Result},
    types,
    AggregateQuery, DeleteQuery, FindQuery, Translation, UpdateQuery,
};
use bson::{doc, Bson, Document};


/// Bidirectional alias map over SELECT items: `expression text -> alias` and
/// back. A name resolving to two different targets is a compile error, never
/// a silent pick.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct AliasHolder {
    alias_to_expr: std::collections::BTreeMap<String, String>,
    expr_to_alias: std::collections::BTreeMap<String, String>,
}

impl AliasHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, expr_key: String, alias: String) -> Result<()> {
        if let Some(existing) = self.alias_to_expr.get(&alias) {
            if existing != &expr_key {
                return Err(Error::AmbiguousAlias(alias));
            }
        }
        if let Some(existing) = self.expr_to_alias.get(&expr_key) {
            if existing != &alias {
                return Err(Error::AmbiguousAlias(expr_key));
            }
        }
        if expr_key != alias {
            if self.alias_to_expr.contains_key(&expr_key) {
                return Err(Error::AmbiguousAlias(expr_key));
            }
            if self.expr_to_alias.contains_key(&alias) {
                return Err(Error::AmbiguousAlias(alias));
            }
        }
        self.alias_to_expr.insert(alias.clone(), expr_key.clone());
        self.expr_to_alias.insert(expr_key, alias);
        Ok(())
    }

    pub fn alias_for(&self, expr_key: &str) -> Option<&str> {
        self.expr_to_alias.get(expr_key).map(String::as_str)
    }

    pub fn source_for(&self, alias: &str) -> Option<&str> {
        self.alias_to_expr.get(alias).map(String::as_str)
    }
}

pub(crate) fn translate_select(
    statement: &SelectStatement,
    options: &TranslateOptions,
) -> Result<Translation> {
    validate_select_items(statement)?;
    if requires_multistep_aggregation(statement) {
        let (collection, pipeline) = build_pipeline(statement, options)?;
        return Ok(Translation::Aggregate(AggregateQuery {
            collection,
            pipeline,
        }));
    }

    // Without grouping there is no stage a HAVING could run against.
    if statement.having.is_some() {
        return Err(Error::UnsupportedConstruct(
            "HAVING requires a GROUP BY or aggregate SELECT items".to_string(),
        ));
    }

    let FromItem::Table { name, .. } = &statement.from else {
        unreachable!("subquery sources always require aggregation");
    };
    let base = base_names(&statement.from);
    let aliases = build_alias_holder(statement, &base)?;

    let filter = match &statement.where_clause {
        Some(w) => ExprCompiler::new(options, false).compile(&strip_expr(&base, w))?,
        None => Document::new(),
    };

    let count_only = statement.items.len() == 1 && is_count_all_item(&statement.items[0]);
    if !count_only && statement.items.iter().any(is_count_all_item) {
        return Err(Error::UnsupportedConstruct(
            "count(*) must be the only SELECT item unless the query has a GROUP BY".to_string(),
        ));
    }

    let projection = if count_only {
        Document::new()
    } else {
        simple_projection(&statement.items, &base)?
    };
    let sort = build_sort(&statement.order_by, &aliases, &base, false)?;

    Ok(Translation::Find(FindQuery {
        collection: name.clone(),
        filter,
        projection,
        sort,
        limit: statement.limit,
        skip: statement.offset,
        count_only,
    }))
}

pub(crate) fn translate_update(
    statement: &UpdateStatement,
    options: &TranslateOptions,
) -> Result<Translation> {
    let filter = compile_simple_filter(&statement.where_clause, &statement.table, options)?;
    let mut set = Document::new();
    let mut unset = Document::new();
    for clause in &statement.sets {
        match &clause.value {
            Some(literal) => {
                set.insert(
                    clause.column.clone(),
                    types::normalize(literal, options.field_type(&clause.column))?,
                );
            }
            // column = NULL removes the field instead of setting it.
            None => {
                unset.insert(clause.column.clone(), "");
            }
        }
    }
    Ok(Translation::Update(UpdateQuery {
        collection: statement.table.clone(),
        filter,
        set,
        unset,
    }))
}

pub(crate) fn translate_delete(
    statement: &DeleteStatement,
    options: &TranslateOptions,
) -> Result<Translation> {
    Ok(Translation::Delete(DeleteQuery {
        collection: statement.table.clone(),
        filter: compile_simple_filter(&statement.where_clause, &statement.table, options)?,
    }))
}

fn compile_simple_filter(
    where_clause: &Option<Expression>,
    table: &str,
    options: &TranslateOptions,
) -> Result<Document> {
    let base = vec![table.to_string()];
    match where_clause {
        Some(w) => ExprCompiler::new(options, false).compile(&strip_expr(&base, w)),
        None => Ok(Document::new()),
    }
}

/// Computed once per statement; selects between the simple filter+projection
/// shape and the aggregation pipeline.
fn requires_multistep_aggregation(statement: &SelectStatement) -> bool {
    matches!(statement.from, FromItem::Subquery { .. })
        || !statement.joins.is_empty()
        || !statement.group_by.is_empty()
        || statement.items.iter().any(|item| {
            is_aggregate_item(item) && !is_count_all_item(item)
        })
}

fn is_aggregate_item(item: &SelectItem) -> bool {
    match item {
        SelectItem::Expression { expr, .. } => match expr.unparenthesized() {
            Expression::Function { name, .. } => expr::is_aggregate(name),
            _ => false,
        },
        SelectItem::Star => false,
    }
}

fn is_count_all_item(item: &SelectItem) -> bool {
    match item {
        SelectItem::Expression { expr, .. } => match expr.unparenthesized() {
            Expression::Function { name, args } => {
                name.eq_ignore_ascii_case("count")
                    && matches!(args.as_slice(), [Expression::Column(c)] if c == "*")
            }
            _ => false,
        },
        SelectItem::Star => false,
    }
}

fn validate_select_items(statement: &SelectStatement) -> Result<()> {
    for item in &statement.items {
        match item {
            SelectItem::Star => {}
            SelectItem::Expression { expr, .. } => match expr.unparenthesized() {
                Expression::Column(_) => {}
                Expression::Function { name, .. } if expr::is_aggregate(name) => {}
                other => {
                    return Err(Error::UnsupportedConstruct(format!(
                        "SELECT items must be columns or aggregate functions: {}",
                        other
                    )))
                }
            },
        }
    }
    Ok(())
}

/// Recursively compiles one SELECT into `(collection, ordered stage list)`.
/// A subquery source contributes its own stages first; the outer query's
/// stages follow in the canonical order: match, lookups/unwinds, group,
/// group projection, having match, column pruning, sort, skip, limit.
fn build_pipeline(
    statement: &SelectStatement,
    options: &TranslateOptions,
) -> Result<(String, Vec<Document>)> {
    validate_select_items(statement)?;
    let mut stages = Vec::new();

    let collection = match &statement.from {
        FromItem::Table { name, .. } => name.clone(),
        FromItem::Subquery { query, .. } => {
            let (collection, inner) = build_pipeline(query, options)?;
            stages.extend(inner);
            collection
        }
    };
    let base = base_names(&statement.from);
    let aliases = build_alias_holder(statement, &base)?;

    // Partition the WHERE clause: conjuncts that only touch the base table
    // match before the lookups; conjuncts referencing a single join target
    // are deferred into that join's lookup $match; the rest match after the
    // unwinds, on embedded paths.
    let join_aliases: Vec<&str> = statement
        .joins
        .iter()
        .filter_map(|j| j.from.effective_alias())
        .collect();
    let mut base_conjuncts: Vec<Expression> = Vec::new();
    let mut join_conjuncts: Vec<Vec<&Expression>> = vec![Vec::new(); statement.joins.len()];
    let mut post_conjuncts: Vec<Expression> = Vec::new();
    if let Some(where_clause) = &statement.where_clause {
        if statement.joins.is_empty() {
            base_conjuncts.push(strip_expr(&base, where_clause));
        } else {
            let mut conjuncts = Vec::new();
            expr::flatten_logical(LogicalOp::And, where_clause, &mut conjuncts);
            for conjunct in conjuncts {
                let mut columns = Vec::new();
                ast::collect_columns(conjunct, &mut columns);
                let mut referenced: Vec<usize> = columns
                    .iter()
                    .filter_map(|c| {
                        ast::qualifier(c)
                            .and_then(|(q, _)| join_aliases.iter().position(|a| *a == q))
                    })
                    .collect();
                referenced.sort_unstable();
                referenced.dedup();
                match referenced.as_slice() {
                    [] => base_conjuncts.push(strip_expr(&base, conjunct)),
                    [index] => join_conjuncts[*index].push(conjunct),
                    _ => post_conjuncts.push(strip_expr(&base, conjunct)),
                }
            }
        }
    }

    let compiler = ExprCompiler::new(options, true);
    if !base_conjuncts.is_empty() {
        stages.push(doc! {"$match": combine_conjuncts(&compiler, &base_conjuncts)?});
    }

    stages.extend(join::compile_joins(
        &statement.joins,
        &join_conjuncts,
        &base,
        options,
    )?);

    if !post_conjuncts.is_empty() {
        stages.push(doc! {"$match": combine_conjuncts(&compiler, &post_conjuncts)?});
    }

    let group_needed = !statement.group_by.is_empty()
        || statement
            .items
            .iter()
            .any(|i| is_aggregate_item(i) && !is_count_all_item(i));
    if group_needed {
        let (group, projection) = build_group(statement, &base)?;
        stages.push(doc! {"$group": group});
        stages.push(doc! {"$project": projection});
    } else if statement.items.iter().any(is_count_all_item) {
        return Err(Error::UnsupportedConstruct(
            "count(*) requires a GROUP BY in a multistep query".to_string(),
        ));
    }

    if let Some(having) = &statement.having {
        let having_compiler = ExprCompiler::for_having(options, &aliases);
        stages.push(doc! {"$match": having_compiler.compile(&strip_expr(&base, having))?});
    }

    let star = statement.items.iter().any(|i| matches!(i, SelectItem::Star));
    if !group_needed && !star {
        stages.push(doc! {"$project": pipeline_projection(&statement.items, &base)?});
    }

    if let Some(sort) = build_sort(&statement.order_by, &aliases, &base, true)? {
        stages.push(doc! {"$sort": sort});
    }
    if let Some(offset) = statement.offset {
        stages.push(doc! {"$skip": offset});
    }
    if let Some(limit) = statement.limit {
        stages.push(doc! {"$limit": limit});
    }

    Ok((collection, stages))
}

fn combine_conjuncts(compiler: &ExprCompiler, conjuncts: &[Expression]) -> Result<Document> {
    if conjuncts.len() == 1 {
        compiler.compile(&conjuncts[0])
    } else {
        let compiled = conjuncts
            .iter()
            .map(|c| compiler.compile(c).map(Bson::Document))
            .collect::<Result<Vec<Bson>>>()?;
        Ok(doc! {"$and": compiled})
    }
}

/// Builds the `$group` stage and the projection that re-exposes its keys and
/// aggregates under their SQL names.
fn build_group(statement: &SelectStatement, base: &[String]) -> Result<(Document, Document)> {
    let keys: Vec<String> = statement
        .group_by
        .iter()
        .map(|k| strip_column(base, k))
        .collect();
    let id = match keys.as_slice() {
        [] => Bson::Null,
        [key] => Bson::String(format!("${}", key)),
        many => Bson::Document(
            many.iter()
                .map(|k| (group_key_name(k), Bson::String(format!("${}", k))))
                .collect(),
        ),
    };
    let mut group = doc! {"_id": id};
    let mut projection = Document::new();

    for item in &statement.items {
        let SelectItem::Expression { expr, alias } = item else {
            return Err(Error::UnsupportedConstruct(
                "SELECT * cannot be combined with GROUP BY".to_string(),
            ));
        };
        match expr.unparenthesized() {
            Expression::Column(c) => {
                let column = strip_column(base, c);
                if !keys.contains(&column) {
                    return Err(Error::UnsupportedConstruct(format!(
                        "column {} must appear in the GROUP BY clause",
                        column
                    )));
                }
                let name = alias.clone().unwrap_or_else(|| group_key_name(&column));
                let value = if keys.len() == 1 {
                    Bson::String("$_id".to_string())
                } else {
                    Bson::String(format!("$_id.{}", group_key_name(&column)))
                };
                projection.insert(name, value);
            }
            Expression::Function { name, args } => {
                let field = alias
                    .clone()
                    .unwrap_or_else(|| expr::aggregate_field_name(name, args));
                let lower = name.to_lowercase();
                let accumulator = if lower == "count" {
                    doc! {"$sum": 1}
                } else {
                    let column = match args.first().map(Expression::unparenthesized) {
                        Some(Expression::Column(c)) if c != "*" => strip_column(base, c),
                        _ => {
                            return Err(Error::UnsupportedConstruct(format!(
                                "{} requires a column argument: {}",
                                name, expr
                            )))
                        }
                    };
                    doc! {format!("${}", lower): format!("${}", column)}
                };
                group.insert(field.clone(), accumulator);
                projection.insert(field, 1_i32);
            }
            other => {
                return Err(Error::UnsupportedConstruct(format!(
                    "SELECT items must be columns or aggregate functions: {}",
                    other
                )))
            }
        }
    }
    projection.insert("_id", 0_i32);
    Ok((group, projection))
}

// Group sub-document keys cannot contain dots.
fn group_key_name(key: &str) -> String {
    key.replace('.', "_")
}

fn simple_projection(items: &[SelectItem], base: &[String]) -> Result<Document> {
    if items.iter().any(|i| matches!(i, SelectItem::Star)) {
        if items.len() > 1 {
            return Err(Error::UnsupportedConstruct(
                "SELECT * cannot be combined with other items".to_string(),
            ));
        }
        return Ok(Document::new());
    }
    pipeline_projection(items, base)
}

fn pipeline_projection(items: &[SelectItem], base: &[String]) -> Result<Document> {
    let mut projection = doc! {"_id": 0};
    for item in items {
        let SelectItem::Expression { expr, alias } = item else {
            return Err(Error::UnsupportedConstruct(
                "SELECT * cannot be combined with other items".to_string(),
            ));
        };
        match expr.unparenthesized() {
            Expression::Column(c) => {
                let column = strip_column(base, c);
                match alias {
                    Some(a) => projection.insert(a.clone(), format!("${}", column)),
                    None => projection.insert(column, 1_i32),
                };
            }
            other => {
                return Err(Error::UnsupportedConstruct(format!(
                    "cannot project {}",
                    other
                )))
            }
        }
    }
    Ok(projection)
}

/// `projected` selects which names the sort runs against: a pipeline `$sort`
/// follows the projection and sees output names, while a find sort runs on
/// stored documents, so aliases resolve back to their source fields there.
fn build_sort(
    order_by: &[ast::OrderByElement],
    aliases: &AliasHolder,
    base: &[String],
    projected: bool,
) -> Result<Option<Document>> {
    if order_by.is_empty() {
        return Ok(None);
    }
    let mut sort = Document::new();
    for element in order_by {
        let stripped = strip_expr(base, &element.expr);
        let key_text = stripped.to_string();
        let key = if projected {
            if let Some(alias) = aliases.alias_for(&key_text) {
                alias.to_string()
            } else {
                match stripped.unparenthesized() {
                    Expression::Column(c) => {
                        // An alias used directly in ORDER BY sorts on itself.
                        c.clone()
                    }
                    Expression::Function { name, args } if expr::is_aggregate(name) => {
                        expr::aggregate_field_name(name, args)
                    }
                    other => {
                        return Err(Error::UnsupportedConstruct(format!(
                            "cannot ORDER BY {}",
                            other
                        )))
                    }
                }
            }
        } else {
            match stripped.unparenthesized() {
                Expression::Column(c) => match aliases.source_for(c) {
                    Some(source) => source.to_string(),
                    None => c.clone(),
                },
                other => {
                    return Err(Error::UnsupportedConstruct(format!(
                        "cannot ORDER BY {}",
                        other
                    )))
                }
            }
        };
        let direction = match element.direction {
            Direction::Asc => 1_i32,
            Direction::Desc => -1_i32,
        };
        sort.insert(key, direction);
    }
    Ok(Some(sort))
}

fn build_alias_holder(statement: &SelectStatement, base: &[String]) -> Result<AliasHolder> {
    let mut holder = AliasHolder::new();
    for item in &statement.items {
        if let SelectItem::Expression {
            expr,
            alias: Some(alias),
        } = item
        {
            holder.insert(strip_expr(base, expr).to_string(), alias.clone())?;
        }
    }
    Ok(holder)
}

/// The names the base from-item answers to; columns qualified with one of
/// them have the qualifier stripped before compilation.
fn base_names(from: &FromItem) -> Vec<String> {
    match from {
        FromItem::Table { name, alias } => {
            let mut names = Vec::new();
            if let Some(a) = alias {
                names.push(a.clone());
            }
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
            names
        }
        FromItem::Subquery { alias, .. } => alias.iter().cloned().collect(),
    }
}

fn strip_column(base: &[String], column: &str) -> String {
    match ast::qualifier(column) {
        Some((q, rest)) if base.iter().any(|n| n == q) => rest.to_string(),
        _ => column.to_string(),
    }
}

fn strip_expr(base: &[String], expr: &Expression) -> Expression {
    ast::map_columns(expr, &mut |c| strip_column(base, c))
}
