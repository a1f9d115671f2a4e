//! Per-entity search configuration
//!
//! Each searchable entity registers one immutable `EntitySearchConfig` at
//! startup: which fields may be searched or sorted, how external names map
//! to storage paths, which relations exist and how they join, which
//! relations are eagerly fetched, and which fields are evaluated through an
//! existence subquery. The configuration is the sole whitelist consulted
//! when caller-supplied field names are turned into query fragments.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filter::FieldKind;
use crate::request::SortDirection;

/// Join recipe for one relation path segment.
///
/// `local_key` lives on the base table, `foreign_key` on the related table:
/// `LEFT JOIN {table} {alias} ON {alias}.{foreign_key} = {base}.{local_key}`.
#[derive(Debug, Clone)]
pub struct Relation {
    pub name: String,
    pub table: String,
    pub alias: String,
    pub local_key: String,
    pub foreign_key: String,
    /// One-to-many / many-to-many relations multiply joined rows; joining
    /// them forces a distinct selection.
    pub multi_valued: bool,
}

/// One default-sort entry.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Immutable search configuration for one entity. Built once through
/// [`EntitySearchConfig::builder`] and shared across all requests.
#[derive(Debug, Clone)]
pub struct EntitySearchConfig {
    entity: String,
    table: String,
    table_alias: String,
    id_column: String,
    searchable_fields: BTreeSet<String>,
    sortable_fields: BTreeSet<String>,
    default_search_columns: Vec<String>,
    field_aliases: HashMap<String, String>,
    field_kinds: HashMap<String, FieldKind>,
    relations: HashMap<String, Relation>,
    fetch_joins: Vec<String>,
    use_distinct: bool,
    default_sort: Vec<SortKey>,
    subquery_fields: BTreeSet<String>,
}

impl EntitySearchConfig {
    pub fn builder(entity: impl Into<String>, table: impl Into<String>) -> EntitySearchConfigBuilder {
        EntitySearchConfigBuilder {
            entity: entity.into(),
            table: table.into(),
            table_alias: "e".to_string(),
            id_column: "id".to_string(),
            searchable_fields: BTreeSet::new(),
            sortable_fields: BTreeSet::new(),
            default_search_columns: Vec::new(),
            field_aliases: HashMap::new(),
            field_kinds: HashMap::new(),
            relations: HashMap::new(),
            fetch_joins: Vec::new(),
            use_distinct: false,
            default_sort: Vec::new(),
            subquery_fields: BTreeSet::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn searchable_fields(&self) -> &BTreeSet<String> {
        &self.searchable_fields
    }

    pub fn sortable_fields(&self) -> &BTreeSet<String> {
        &self.sortable_fields
    }

    pub fn default_search_columns(&self) -> &[String] {
        &self.default_search_columns
    }

    pub fn field_aliases(&self) -> &HashMap<String, String> {
        &self.field_aliases
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn fetch_joins(&self) -> &[String] {
        &self.fetch_joins
    }

    pub fn use_distinct(&self) -> bool {
        self.use_distinct
    }

    pub fn default_sort(&self) -> &[SortKey] {
        &self.default_sort
    }

    pub fn subquery_fields(&self) -> &BTreeSet<String> {
        &self.subquery_fields
    }

    pub fn is_subquery_field(&self, path: &str) -> bool {
        self.subquery_fields.contains(path)
    }

    /// Declared value kind of a storage path, `Unknown` when undeclared.
    pub fn kind_of(&self, path: &str) -> FieldKind {
        self.field_kinds.get(path).copied().unwrap_or_default()
    }
}

/// Validating builder for [`EntitySearchConfig`]. Configuration mistakes
/// fail at startup, unlike request input which degrades at runtime.
#[derive(Debug)]
pub struct EntitySearchConfigBuilder {
    entity: String,
    table: String,
    table_alias: String,
    id_column: String,
    searchable_fields: BTreeSet<String>,
    sortable_fields: BTreeSet<String>,
    default_search_columns: Vec<String>,
    field_aliases: HashMap<String, String>,
    field_kinds: HashMap<String, FieldKind>,
    relations: HashMap<String, Relation>,
    fetch_joins: Vec<String>,
    use_distinct: bool,
    default_sort: Vec<SortKey>,
    subquery_fields: BTreeSet<String>,
}

impl EntitySearchConfigBuilder {
    pub fn table_alias(mut self, alias: impl Into<String>) -> Self {
        self.table_alias = alias.into();
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn searchable_field(mut self, path: impl Into<String>) -> Self {
        self.searchable_fields.insert(path.into());
        self
    }

    pub fn searchable_fields<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable_fields.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn sortable_field(mut self, path: impl Into<String>) -> Self {
        self.sortable_fields.insert(path.into());
        self
    }

    pub fn sortable_fields<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sortable_fields.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn default_search_columns<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_search_columns = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Map an externally-exposed field name to a storage path.
    pub fn field_alias(mut self, external: impl Into<String>, target: impl Into<String>) -> Self {
        self.field_aliases.insert(external.into(), target.into());
        self
    }

    pub fn field_kind(mut self, path: impl Into<String>, kind: FieldKind) -> Self {
        self.field_kinds.insert(path.into(), kind);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    /// Eagerly join this relation when materializing results.
    pub fn fetch_join(mut self, relation_name: impl Into<String>) -> Self {
        let name = relation_name.into();
        if !self.fetch_joins.contains(&name) {
            self.fetch_joins.push(name);
        }
        self
    }

    pub fn use_distinct(mut self, distinct: bool) -> Self {
        self.use_distinct = distinct;
        self
    }

    pub fn default_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.default_sort.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    /// Evaluate filters on this field through an existence subquery instead
    /// of a join.
    pub fn subquery_field(mut self, path: impl Into<String>) -> Self {
        self.subquery_fields.insert(path.into());
        self
    }

    pub fn build(self) -> Result<EntitySearchConfig> {
        if self.entity.is_empty() || self.table.is_empty() {
            return Err(Error::Configuration(
                "Entity name and table must not be empty".to_string(),
            ));
        }

        for path in self.searchable_fields.iter().chain(&self.sortable_fields) {
            self.check_path(path)?;
        }

        for column in &self.default_search_columns {
            if !self.searchable_fields.contains(column) {
                return Err(Error::Configuration(format!(
                    "Default search column '{}' is not a searchable field of '{}'",
                    column, self.entity
                )));
            }
        }

        for (external, target) in &self.field_aliases {
            if !self.searchable_fields.contains(target) && !self.sortable_fields.contains(target) {
                return Err(Error::Configuration(format!(
                    "Alias '{}' targets '{}', which is neither searchable nor sortable on '{}'",
                    external, target, self.entity
                )));
            }
        }

        for name in &self.fetch_joins {
            if !self.relations.contains_key(name) {
                return Err(Error::Configuration(format!(
                    "Fetch join '{}' does not name a declared relation of '{}'",
                    name, self.entity
                )));
            }
        }

        for key in &self.default_sort {
            if !self.sortable_fields.contains(&key.field) {
                return Err(Error::Configuration(format!(
                    "Default sort field '{}' is not a sortable field of '{}'",
                    key.field, self.entity
                )));
            }
        }

        for path in &self.subquery_fields {
            if !self.searchable_fields.contains(path) {
                return Err(Error::Configuration(format!(
                    "Subquery field '{}' is not a searchable field of '{}'",
                    path, self.entity
                )));
            }
            if !path.contains('.') {
                return Err(Error::Configuration(format!(
                    "Subquery field '{}' must traverse a relation",
                    path
                )));
            }
        }

        let mut aliases: BTreeSet<&str> = BTreeSet::new();
        aliases.insert(self.table_alias.as_str());
        for relation in self.relations.values() {
            if !aliases.insert(relation.alias.as_str()) {
                return Err(Error::Configuration(format!(
                    "Relation alias '{}' is not unique within '{}'",
                    relation.alias, self.entity
                )));
            }
        }

        Ok(EntitySearchConfig {
            entity: self.entity,
            table: self.table,
            table_alias: self.table_alias,
            id_column: self.id_column,
            searchable_fields: self.searchable_fields,
            sortable_fields: self.sortable_fields,
            default_search_columns: self.default_search_columns,
            field_aliases: self.field_aliases,
            field_kinds: self.field_kinds,
            relations: self.relations,
            fetch_joins: self.fetch_joins,
            use_distinct: self.use_distinct,
            default_sort: self.default_sort,
            subquery_fields: self.subquery_fields,
        })
    }

    fn check_path(&self, path: &str) -> Result<()> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        match segments.next() {
            None => Ok(()),
            Some(_) if segments.next().is_some() => Err(Error::Configuration(format!(
                "Field path '{}' nests deeper than one relation",
                path
            ))),
            Some(_) => {
                if self.relations.contains_key(first) {
                    Ok(())
                } else {
                    Err(Error::Configuration(format!(
                        "Field path '{}' references undeclared relation '{}'",
                        path, first
                    )))
                }
            }
        }
    }
}

/// Startup-time lookup of entity configurations.
///
/// Registered once during application wiring and shared read-only
/// afterwards; registration of the same entity twice is a configuration
/// error, not a silent overwrite.
#[derive(Debug, Default)]
pub struct SearchConfigRegistry {
    configs: HashMap<String, Arc<EntitySearchConfig>>,
}

impl SearchConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, config: EntitySearchConfig) -> Result<()> {
        let entity = config.entity().to_string();
        if self.configs.contains_key(&entity) {
            return Err(Error::Configuration(format!(
                "A search configuration for '{}' is already registered",
                entity
            )));
        }
        self.configs.insert(entity, Arc::new(config));
        Ok(())
    }

    pub fn get(&self, entity: &str) -> Option<Arc<EntitySearchConfig>> {
        self.configs.get(entity).cloned()
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_relation() -> Relation {
        Relation {
            name: "category".to_string(),
            table: "categories".to_string(),
            alias: "cat".to_string(),
            local_key: "category_id".to_string(),
            foreign_key: "id".to_string(),
            multi_valued: false,
        }
    }

    #[test]
    fn builder_accepts_a_complete_configuration() {
        let config = EntitySearchConfig::builder("customer", "customers")
            .searchable_fields(["name", "description", "category.name"])
            .sortable_fields(["name", "category.name"])
            .default_search_columns(["name", "description"])
            .field_alias("categoryName", "category.name")
            .relation(category_relation())
            .fetch_join("category")
            .default_sort("name", SortDirection::Ascending)
            .build()
            .unwrap();

        assert_eq!(config.entity(), "customer");
        assert_eq!(config.table_alias(), "e");
        assert_eq!(config.id_column(), "id");
        assert_eq!(config.kind_of("name"), FieldKind::Unknown);
    }

    #[test]
    fn default_search_columns_must_be_searchable() {
        let err = EntitySearchConfig::builder("customer", "customers")
            .searchable_field("name")
            .default_search_columns(["name", "description"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn alias_target_must_be_whitelisted() {
        let err = EntitySearchConfig::builder("customer", "customers")
            .searchable_field("name")
            .field_alias("secret", "password_hash")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("password_hash"));
    }

    #[test]
    fn dotted_path_requires_a_declared_relation() {
        let err = EntitySearchConfig::builder("customer", "customers")
            .searchable_field("category.name")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn subquery_fields_must_be_searchable_relation_paths() {
        let err = EntitySearchConfig::builder("customer", "customers")
            .searchable_field("name")
            .subquery_field("tags.name")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("tags.name"));

        let err = EntitySearchConfig::builder("customer", "customers")
            .searchable_field("name")
            .subquery_field("name")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must traverse"));
    }

    #[test]
    fn default_sort_must_be_sortable() {
        let err = EntitySearchConfig::builder("customer", "customers")
            .searchable_field("name")
            .default_sort("name", SortDirection::Ascending)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not a sortable field"));
    }

    #[test]
    fn fetch_join_must_name_a_relation() {
        let err = EntitySearchConfig::builder("customer", "customers")
            .fetch_join("category")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn registry_rejects_duplicate_registration() {
        let mut registry = SearchConfigRegistry::new();
        let config = || {
            EntitySearchConfig::builder("customer", "customers")
                .searchable_field("name")
                .build()
                .unwrap()
        };
        registry.register(config()).unwrap();
        assert!(registry.register(config()).is_err());
        assert!(registry.get("customer").is_some());
        assert!(registry.get("order").is_none());
    }
}
