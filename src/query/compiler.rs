//! `QueryCompiler`: pure translation from a structured query description to
//! `(sql, values)`. Grounded on `SqlConverter`'s `read_one`/`read_many`/
//! `write_one`/`write_many`/`update`/`delete` and their `parse_*` helpers,
//! restructured so each compilation rule of spec.md §4.3 is one method
//! instead of one `.format()` template filled in by a handful of
//! string-builder helpers. Never touches the engine; callers own execution.

use super::condition::{referenced_fields, Predicate, PredicateTerm};
use super::types::{OnConflict, Order};
use crate::error::{Result, TreeError};
use crate::schema::{SqlTable, TreeSchema};
use crate::value::{FieldKind, Record, Value};
use std::collections::HashSet;

pub struct QueryCompiler<'a> {
    schema: &'a TreeSchema,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(schema: &'a TreeSchema) -> Self {
        Self { schema }
    }

    fn nodes_table(&self) -> &str {
        &self.schema.nodes.name
    }

    /// Rule 1: `"*"` stays literal (qualified to the nodes table so a join
    /// doesn't duplicate columns); otherwise each field is qualified to the
    /// table that actually stores it.
    fn select_list(&self, fields: &[String]) -> Result<String> {
        if fields.is_empty() || fields.iter().any(|f| f == "*") {
            return Ok(format!("{}.*", self.nodes_table()));
        }
        fields
            .iter()
            .map(|f| {
                self.schema
                    .namespace(f)
                    .map(|ns| ns.select_sql())
                    .ok_or_else(|| TreeError::query(format!("unknown field: {f}")))
            })
            .collect::<Result<Vec<_>>>()
            .map(|cols| cols.join(", "))
    }

    /// Rule 2: always join metadata (needed for `depth` and cheap root
    /// lookups), plus one join per referenced field that isn't stored
    /// directly on the nodes table, deduplicated.
    fn join_clause(&self, referenced: &[String]) -> String {
        let mut joins = Vec::new();
        if let Some(depth) = self.schema.namespace("depth") {
            joins.push(depth.join_sql(self.nodes_table()));
        }
        for field in referenced {
            if let Some(ns) = self.schema.namespace(field) {
                if ns.is_joinable() {
                    joins.push(ns.join_sql(self.nodes_table()));
                }
            }
        }
        let mut seen = HashSet::new();
        joins.retain(|j| seen.insert(j.clone()));
        joins.join(" ")
    }

    /// Rule 3: render the flat predicate list, defaulting the connective
    /// between adjacent predicates to AND and parenthesising one level of
    /// nested groups.
    fn where_clause(&self, conds: &[PredicateTerm]) -> Result<(String, Vec<Value>)> {
        if conds.is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let (rendered, values) = render_terms(conds, self.schema)?;
        Ok((format!("WHERE {rendered}"), values))
    }

    fn order_clause(&self, order: Option<&Order>) -> Result<String> {
        let Some(order) = order else { return Ok(String::new()) };
        if order.fields.is_empty() {
            return Ok(String::new());
        }
        let cols = order
            .fields
            .iter()
            .map(|f| {
                self.schema
                    .namespace(f)
                    .map(|ns| ns.select_sql())
                    .ok_or_else(|| TreeError::query(format!("unknown field: {f}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("ORDER BY {} {}", cols.join(", "), order.axis.as_sql()))
    }

    fn joined(parts: Vec<String>) -> String {
        parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" ")
    }

    pub fn compile_select(
        &self,
        fields: &[String],
        conds: &[PredicateTerm],
        order: Option<&Order>,
        limit: Option<u64>,
    ) -> Result<(String, Vec<Value>)> {
        let select = self.select_list(fields)?;

        let mut referenced = referenced_fields(conds);
        referenced.extend(fields.iter().cloned());
        if let Some(order) = order {
            referenced.extend(order.fields.iter().cloned());
        }
        let joins = self.join_clause(&referenced);

        let (where_sql, values) = self.where_clause(conds)?;
        let order_sql = self.order_clause(order)?;
        let limit_sql = limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();

        let sql = Self::joined(vec![
            format!("SELECT {select} FROM {}", self.nodes_table()),
            joins,
            where_sql,
            order_sql,
            limit_sql,
        ]);
        Ok((format!("{sql};"), values))
    }

    /// Rule 6: `INSERT <conflict>? INTO <table>(cols) VALUES(?, ...)`.
    pub fn compile_insert(
        &self,
        table: &dyn SqlTable,
        record: &Record,
        on_conflict: OnConflict,
    ) -> (String, Vec<Value>) {
        let columns: Vec<&str> = record.fields().collect();
        let sql = Self::insert_sql(table.name(), &columns, on_conflict);
        let values = record.iter().map(|(_, v)| v.clone()).collect();
        (sql, values)
    }

    /// Same statement shape as `compile_insert`, reused across a whole
    /// batch (spec.md §4.5 stage 4's `executeMany`). The caller executes
    /// this once per row in the batch, each with its own bind values.
    pub fn compile_insert_many(&self, table: &dyn SqlTable, columns: &[String], on_conflict: OnConflict) -> String {
        Self::insert_sql(table.name(), columns, on_conflict)
    }

    fn insert_sql(table_name: &str, columns: &[impl AsRef<str>], on_conflict: OnConflict) -> String {
        let anchors = vec!["?"; columns.len()].join(", ");
        let conflict = on_conflict.sql();
        let prefix = if conflict.is_empty() { "INSERT".to_string() } else { format!("INSERT {conflict}") };
        let cols = columns.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ");
        format!("{prefix} INTO {table_name}({cols}) VALUES({anchors});")
    }

    /// Rule 7: setter pairs become `f = ?`; every setter in one call must
    /// share an owning table, derived from the first pair's namespace.
    pub fn compile_update(&self, setters: &[(String, Value)], conds: &[PredicateTerm]) -> Result<(String, Vec<Value>)> {
        if setters.is_empty() {
            return Err(TreeError::query("update requires at least one setter"));
        }
        let first_ns = self
            .schema
            .namespace(&setters[0].0)
            .ok_or_else(|| TreeError::query(format!("unknown field: {}", setters[0].0)))?;
        let table = first_ns.owning_table.clone();
        for (field, _) in setters {
            let ns = self
                .schema
                .namespace(field)
                .ok_or_else(|| TreeError::query(format!("unknown field: {field}")))?;
            if ns.owning_table != table {
                return Err(TreeError::query("all setters in one update must share one owning table"));
            }
        }

        let setter_sql = setters.iter().map(|(f, _)| format!("{f} = ?")).collect::<Vec<_>>().join(", ");
        let mut values: Vec<Value> = setters.iter().map(|(_, v)| v.clone()).collect();
        let (where_sql, cond_values) = self.where_clause(conds)?;
        values.extend(cond_values);

        let sql = Self::joined(vec![format!("UPDATE {table} SET {setter_sql}"), where_sql]);
        Ok((format!("{sql};"), values))
    }

    /// Rule 4: a condition touching a field that lives off the nodes table
    /// can't be expressed as `DELETE ... JOIN ...` in SQLite, so it's
    /// rewritten into `id IN (SELECT id FROM <nodes> <joins> WHERE ...)`.
    pub fn compile_delete(&self, conds: &[PredicateTerm]) -> Result<(String, Vec<Value>)> {
        let referenced = referenced_fields(conds);
        let needs_join = referenced
            .iter()
            .any(|f| self.schema.namespace(f).map(|ns| ns.is_joinable()).unwrap_or(false));

        if !needs_join {
            let (where_sql, values) = self.where_clause(conds)?;
            let sql = Self::joined(vec![format!("DELETE FROM {}", self.nodes_table()), where_sql]);
            return Ok((format!("{sql};"), values));
        }

        let joins = self.join_clause(&referenced);
        let (rendered, values) = render_terms(conds, self.schema)?;
        let nodes = self.nodes_table();
        let subquery = format!("SELECT {nodes}.id FROM {nodes} {joins} WHERE {rendered}");
        Ok((format!("DELETE FROM {nodes} WHERE id IN ({subquery});"), values))
    }
}

fn render_terms(terms: &[PredicateTerm], schema: &TreeSchema) -> Result<(String, Vec<Value>)> {
    let mut parts = Vec::new();
    let mut values = Vec::new();
    let mut prev_was_predicate = false;

    for term in terms {
        match term {
            PredicateTerm::And => {
                parts.push("AND".to_string());
                prev_was_predicate = false;
            }
            PredicateTerm::Or => {
                parts.push("OR".to_string());
                prev_was_predicate = false;
            }
            PredicateTerm::Pred(pred) => {
                if prev_was_predicate {
                    parts.push("AND".to_string());
                }
                match pred {
                    Predicate::Leaf(cmp) => {
                        let ns = schema
                            .namespace(&cmp.field)
                            .ok_or_else(|| TreeError::query(format!("unknown field: {}", cmp.field)))?;
                        let anchor = cmp.op.anchor(&cmp.value);
                        parts.push(format!("{} {} {anchor}", ns.where_column(), cmp.op));
                        push_bind_values(&mut values, &cmp.value);
                    }
                    Predicate::Group(inner) => {
                        let (rendered, inner_values) = render_terms(inner, schema)?;
                        parts.push(format!("({rendered})"));
                        values.extend(inner_values);
                    }
                }
                prev_was_predicate = true;
            }
        }
    }

    Ok((parts.join(" "), values))
}

/// A leaf bound against `IN` with a list value binds one `?` per element;
/// everything else binds a single value as-is.
fn push_bind_values(values: &mut Vec<Value>, value: &Value) {
    match value {
        Value::JsonList(items) => {
            for item in items {
                let kind = FieldKind::infer(item).unwrap_or(FieldKind::Text);
                values.push(Value::from_json(kind, item));
            }
        }
        other => values.push(other.clone()),
    }
}
