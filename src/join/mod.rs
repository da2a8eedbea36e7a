//! Translates SQL joins into `$lookup` + `$unwind` stage pairs. Outer-side
//! columns referenced by the ON clause become correlated `let` bindings;
//! inner-side columns become bare field references inside the lookup's
//! nested pipeline.

use crate::{
    ast::{self, Expression, FromItem, Join, JoinKind},
    expr::ExprCompiler,
    options::TranslateOptions,
    result::{Error, Result},
};
use bson::{doc, Bson, Document};


/// Column rewriting scope for one join's ON clause and any WHERE conjuncts
/// folded into it. Accumulates the `let` bindings as outer columns are
/// encountered, in first-appearance order.
struct OnScope<'a> {
    target_alias: &'a str,
    known_aliases: &'a [String],
    lets: Document,
}

impl<'a> OnScope<'a> {
    fn new(target_alias: &'a str, known_aliases: &'a [String]) -> Self {
        OnScope {
            target_alias,
            known_aliases,
            lets: Document::new(),
        }
    }

    fn rewrite(&mut self, expr: &Expression) -> Expression {
        ast::map_columns(expr, &mut |column| {
            match ast::qualifier(column) {
                // The target's own columns stay plain field references.
                Some((q, rest)) if q == self.target_alias => format!("${}", rest),
                Some((q, rest)) if self.known_aliases.iter().any(|a| a == q) => {
                    self.bind_outer(rest)
                }
                // Unqualified columns belong to the already-materialized side.
                _ => self.bind_outer(column),
            }
        })
    }

    fn bind_outer(&mut self, field_path: &str) -> String {
        let var = sanitize_var(field_path);
        if !self.lets.contains_key(&var) {
            self.lets.insert(var.clone(), format!("${}", field_path));
        }
        format!("$${}", var)
    }
}

/// `let` variable names must be lowercase and cannot contain dots.
fn sanitize_var(field_path: &str) -> String {
    field_path.to_lowercase().replace('.', "_")
}

/// Compiles every join, in declaration order, into its `$lookup`/`$unwind`
/// stage pair. `extra_conditions[i]` holds WHERE conjuncts that reference
/// join `i` and were deferred into its lookup `$match`.
pub(crate) fn compile_joins(
    joins: &[Join],
    extra_conditions: &[Vec<&Expression>],
    known_aliases: &[String],
    options: &TranslateOptions,
) -> Result<Vec<Document>> {
    let mut stages = Vec::with_capacity(joins.len() * 2);
    for (index, join) in joins.iter().enumerate() {
        let preserve_empty = match join.kind {
            JoinKind::Inner => false,
            JoinKind::Left => true,
            other => {
                return Err(Error::UnsupportedConstruct(format!(
                    "{} joins are not supported",
                    other
                )))
            }
        };
        let (collection, alias) = match &join.from {
            FromItem::Table { name, alias } => {
                (name.as_str(), alias.as_deref().unwrap_or(name.as_str()))
            }
            FromItem::Subquery { .. } => {
                return Err(Error::UnsupportedConstruct(
                    "subqueries cannot be join targets".to_string(),
                ))
            }
        };
        let on = join.on.as_ref().ok_or_else(|| {
            Error::UnsupportedConstruct(format!("join on {} is missing an ON clause", collection))
        })?;

        let mut scope = OnScope::new(alias, known_aliases);
        let mut conditions = vec![scope.rewrite(on)];
        for extra in extra_conditions.get(index).into_iter().flatten() {
            conditions.push(scope.rewrite(extra));
        }

        let compiler = ExprCompiler::for_on_clause(options);
        let compiled = conditions
            .iter()
            .map(|c| compiler.compile(c).map(Bson::Document))
            .collect::<Result<Vec<Bson>>>()?;
        let condition = if compiled.len() == 1 {
            compiled.into_iter().next().unwrap()
        } else {
            Bson::Document(doc! {"$and": compiled})
        };

        stages.push(doc! {"$lookup": {
            "from": collection,
            "let": scope.lets,
            "pipeline": [ {"$match": {"$expr": condition}} ],
            "as": alias,
        }});
        stages.push(doc! {"$unwind": {
            "path": format!("${}", alias),
            "preserveNullAndEmptyArrays": preserve_empty,
        }});
    }
    Ok(stages)
}
