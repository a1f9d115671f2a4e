//! SQL query builder for dynamic entity searches.
//!
//! Assembles parameterized SQL from a paged search request plus an entity
//! search configuration:
//! - global search (OR across the configured columns)
//! - per-column filters in the `operator:value` grammar
//! - eager fetch joins for result materialization
//! - existence subqueries for large fan-out relations
//! - deterministic ordering and offset pagination

mod bind;
mod clauses;

pub use bind::BindValue;

use sifter_core::config::{EntitySearchConfig, Relation};
use sifter_core::filter::{parse_filter, FilterOperator, FilterPredicate, FilterValue};
use sifter_core::request::SearchRequest;
use sifter_core::resolve::{resolve_field, FieldUse};
use tracing::warn;

/// A pre-built SQL predicate with its bind values.
///
/// Extension point for callers that already hold a partially-constructed
/// WHERE clause. The fragment's placeholders must be numbered from `$1`;
/// the builder appends its own binds after the fragment's so those
/// placeholders stay valid.
#[derive(Debug, Clone, Default)]
pub struct QueryFragment {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl QueryFragment {
    pub fn new(sql: impl Into<String>, binds: Vec<BindValue>) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }
}

/// Query builder for one search invocation.
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    config: &'a EntitySearchConfig,
    request: &'a SearchRequest,
    base: Option<&'a QueryFragment>,
}

/// Relation joins required by the query under construction, in first-use
/// order.
#[derive(Debug, Default)]
struct JoinSet {
    names: Vec<String>,
}

impl JoinSet {
    fn require(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }
}

enum FieldTarget<'a> {
    /// Column on the base table, fully qualified.
    Column(String),
    /// Column reached through a declared relation.
    RelationColumn(&'a Relation, String),
}

impl<'a> QueryBuilder<'a> {
    pub fn new(config: &'a EntitySearchConfig, request: &'a SearchRequest) -> Self {
        Self {
            config,
            request,
            base: None,
        }
    }

    pub fn with_base_fragment(mut self, base: &'a QueryFragment) -> Self {
        self.base = Some(base);
        self
    }

    /// Build the data query: selection, joins, predicates, ordering, and
    /// offset pagination.
    pub fn build_sql(&self) -> (String, Vec<BindValue>) {
        let mut bind_params = Vec::new();
        let mut joins = JoinSet::default();

        let where_clauses = self.build_where(&mut joins, &mut bind_params);
        let order_items = self.build_order(&mut joins);

        // Fetch joins come first, then whatever the predicates and sorts
        // pulled in on top of them.
        let mut join_relations: Vec<&Relation> = Vec::new();
        for name in self.config.fetch_joins() {
            if let Some(rel) = self.config.relation(name) {
                join_relations.push(rel);
            }
        }
        for name in &joins.names {
            if !join_relations.iter().any(|r| &r.name == name) {
                if let Some(rel) = self.config.relation(name) {
                    join_relations.push(rel);
                }
            }
        }

        let distinct =
            self.config.use_distinct() || join_relations.iter().any(|r| r.multi_valued);

        let alias = self.config.table_alias();
        let mut sql = String::from("SELECT ");
        if distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&format!("{}.*", alias));
        if distinct {
            // PostgreSQL requires ORDER BY expressions to appear in a
            // DISTINCT select list.
            let base_prefix = format!("{}.", alias);
            for (expr, _) in &order_items {
                if !expr.starts_with(&base_prefix) {
                    sql.push_str(", ");
                    sql.push_str(expr);
                }
            }
        }
        sql.push_str(&format!(" FROM {} {}", self.config.table(), alias));

        for rel in &join_relations {
            sql.push_str(&left_join(rel, alias));
        }

        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }

        sql.push_str(" ORDER BY ");
        let rendered: Vec<String> = order_items
            .iter()
            .map(|(expr, dir)| format!("{} {}", expr, dir))
            .collect();
        sql.push_str(&rendered.join(", "));

        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            self.request.pagination.size,
            self.request.pagination.offset()
        ));

        (sql, bind_params)
    }

    /// Build the count query: same predicates, predicate-required joins
    /// only — no fetch joins, no ordering, no limit.
    pub fn build_count_sql(&self) -> (String, Vec<BindValue>) {
        let mut bind_params = Vec::new();
        let mut joins = JoinSet::default();

        let where_clauses = self.build_where(&mut joins, &mut bind_params);

        let join_relations: Vec<&Relation> = joins
            .names
            .iter()
            .filter_map(|name| self.config.relation(name))
            .collect();

        let alias = self.config.table_alias();
        // A multi-valued join multiplies base rows; count distinct
        // identifiers to keep the total honest.
        let count_expr = if join_relations.iter().any(|r| r.multi_valued) {
            format!("COUNT(DISTINCT {}.{})", alias, self.config.id_column())
        } else {
            "COUNT(*)".to_string()
        };

        let mut sql = format!(
            "SELECT {} FROM {} {}",
            count_expr,
            self.config.table(),
            alias
        );
        for rel in &join_relations {
            sql.push_str(&left_join(rel, alias));
        }
        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }

        (sql, bind_params)
    }

    fn build_where(&self, joins: &mut JoinSet, bind_params: &mut Vec<BindValue>) -> Vec<String> {
        let mut clauses = Vec::new();

        if let Some(base) = self.base {
            bind_params.extend(base.binds.iter().cloned());
            if !base.sql.trim().is_empty() {
                clauses.push(format!("({})", base.sql));
            }
        }

        if let Some(global) = self.global_search_clause(joins, bind_params) {
            clauses.push(global);
        }

        clauses.extend(self.column_filter_clauses(joins, bind_params));
        clauses
    }

    /// OR-combine a contains predicate across the resolved global-search
    /// columns.
    fn global_search_clause(
        &self,
        joins: &mut JoinSet,
        bind_params: &mut Vec<BindValue>,
    ) -> Option<String> {
        let global = self.request.global_search.as_ref()?;
        let term = global.term.trim();
        if term.is_empty() {
            return None;
        }

        let paths: Vec<&str> = if global.fields.is_empty() {
            self.config
                .default_search_columns()
                .iter()
                .map(String::as_str)
                .collect()
        } else {
            global
                .fields
                .iter()
                .filter_map(|name| {
                    let resolved = resolve_field(self.config, name, FieldUse::Search);
                    if resolved.is_none() {
                        warn!(
                            entity = self.config.entity(),
                            field = %name,
                            "ignoring unknown global search field"
                        );
                    }
                    resolved
                })
                .collect()
        };

        let predicate = FilterPredicate {
            operator: FilterOperator::Contains,
            value: FilterValue::Text(term.to_string()),
        };

        let mut parts = Vec::new();
        for path in paths {
            if let Some(clause) = self.field_predicate(path, &predicate, joins, bind_params) {
                parts.push(clause);
            }
        }

        if parts.is_empty() {
            None
        } else if parts.len() == 1 {
            Some(parts.remove(0))
        } else {
            Some(format!("({})", parts.join(" OR ")))
        }
    }

    /// One predicate per resolvable, parseable column filter, in request
    /// order. Unknown fields and malformed expressions are dropped with a
    /// warning, never an error.
    fn column_filter_clauses(
        &self,
        joins: &mut JoinSet,
        bind_params: &mut Vec<BindValue>,
    ) -> Vec<String> {
        let mut clauses = Vec::new();
        for column in &self.request.column_filters {
            let Some(raw) = column.filter_expression.as_deref() else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            let Some(path) = resolve_field(self.config, &column.field_name, FieldUse::Search)
            else {
                warn!(
                    entity = self.config.entity(),
                    field = %column.field_name,
                    "ignoring filter on unknown or non-searchable field"
                );
                continue;
            };
            let Some(predicate) = parse_filter(raw, self.config.kind_of(path)) else {
                warn!(
                    entity = self.config.entity(),
                    field = %column.field_name,
                    expression = %raw,
                    "ignoring unparseable filter expression"
                );
                continue;
            };
            if let Some(clause) = self.field_predicate(path, &predicate, joins, bind_params) {
                clauses.push(clause);
            }
        }
        clauses
    }

    /// Render a predicate for one resolved storage path. Subquery fields
    /// become an EXISTS over the relation instead of a join.
    fn field_predicate(
        &self,
        path: &str,
        predicate: &FilterPredicate,
        joins: &mut JoinSet,
        bind_params: &mut Vec<BindValue>,
    ) -> Option<String> {
        match self.target_for(path)? {
            FieldTarget::Column(expr) => {
                clauses::build_predicate_clause(&expr, predicate, bind_params)
            }
            FieldTarget::RelationColumn(rel, column) => {
                let expr = format!("{}.{}", rel.alias, column);
                if self.config.is_subquery_field(path) {
                    let inner = clauses::build_predicate_clause(&expr, predicate, bind_params)?;
                    Some(format!(
                        "EXISTS (SELECT 1 FROM {table} {rel} WHERE {rel}.{fk} = {base}.{lk} AND {inner})",
                        table = rel.table,
                        rel = rel.alias,
                        fk = rel.foreign_key,
                        base = self.config.table_alias(),
                        lk = rel.local_key,
                        inner = inner
                    ))
                } else {
                    joins.require(&rel.name);
                    clauses::build_predicate_clause(&expr, predicate, bind_params)
                }
            }
        }
    }

    /// Ordering: explicit sort entries in request order, then the
    /// configured default sort, then the primary identifier. The
    /// identifier is always appended as the final tiebreaker so that
    /// pagination stays deterministic.
    fn build_order(&self, joins: &mut JoinSet) -> Vec<(String, &'static str)> {
        let mut order_items: Vec<(String, &'static str)> = Vec::new();

        for column in &self.request.column_filters {
            let Some(direction) = column.sort_direction else {
                continue;
            };
            let Some(path) = resolve_field(self.config, &column.field_name, FieldUse::Sort) else {
                warn!(
                    entity = self.config.entity(),
                    field = %column.field_name,
                    "ignoring sort on unknown or non-sortable field"
                );
                continue;
            };
            if let Some(expr) = self.sortable_expr(path, joins) {
                order_items.push((expr, direction.as_sql()));
            }
        }

        if order_items.is_empty() {
            for key in self.config.default_sort() {
                if let Some(expr) = self.sortable_expr(&key.field, joins) {
                    order_items.push((expr, key.direction.as_sql()));
                }
            }
        }

        let id_expr = format!(
            "{}.{}",
            self.config.table_alias(),
            self.config.id_column()
        );
        if !order_items.iter().any(|(expr, _)| *expr == id_expr) {
            order_items.push((id_expr, "ASC"));
        }
        order_items
    }

    fn sortable_expr(&self, path: &str, joins: &mut JoinSet) -> Option<String> {
        match self.target_for(path)? {
            FieldTarget::Column(expr) => Some(expr),
            FieldTarget::RelationColumn(rel, column) => {
                joins.require(&rel.name);
                Some(format!("{}.{}", rel.alias, column))
            }
        }
    }

    fn target_for(&self, path: &str) -> Option<FieldTarget<'a>> {
        match path.split_once('.') {
            None => Some(FieldTarget::Column(format!(
                "{}.{}",
                self.config.table_alias(),
                path
            ))),
            Some((relation_name, column)) => {
                let rel = self.config.relation(relation_name)?;
                Some(FieldTarget::RelationColumn(rel, column.to_string()))
            }
        }
    }
}

fn left_join(rel: &Relation, base_alias: &str) -> String {
    format!(
        " LEFT JOIN {table} {alias} ON {alias}.{fk} = {base}.{lk}",
        table = rel.table,
        alias = rel.alias,
        fk = rel.foreign_key,
        base = base_alias,
        lk = rel.local_key
    )
}
