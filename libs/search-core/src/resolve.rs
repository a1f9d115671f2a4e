//! Field resolution against the per-entity whitelists
//!
//! Every caller-supplied field name passes through here before it can
//! appear in a query fragment. Resolution is use-specific: a field valid
//! for searching is not automatically valid for sorting, and vice versa.

use crate::config::EntitySearchConfig;

/// What the resolved field will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUse {
    Search,
    Sort,
}

/// Resolve an external field name to its storage path.
///
/// Alias lookup first, identity second; membership in the use-specific
/// whitelist is required either way. `None` means the field is rejected —
/// callers drop it with a warning rather than failing the request.
pub fn resolve_field<'a>(
    config: &'a EntitySearchConfig,
    name: &str,
    usage: FieldUse,
) -> Option<&'a str> {
    let target = config
        .field_aliases()
        .get(name)
        .map(String::as_str)
        .unwrap_or(name);
    let whitelist = match usage {
        FieldUse::Search => config.searchable_fields(),
        FieldUse::Sort => config.sortable_fields(),
    };
    whitelist.get(target).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Relation;

    fn config() -> EntitySearchConfig {
        EntitySearchConfig::builder("customer", "customers")
            .searchable_fields(["name", "created_on", "category.name"])
            .sortable_fields(["created_on"])
            .field_alias("createdOn", "created_on")
            .field_alias("categoryName", "category.name")
            .relation(Relation {
                name: "category".to_string(),
                table: "categories".to_string(),
                alias: "cat".to_string(),
                local_key: "category_id".to_string(),
                foreign_key: "id".to_string(),
                multi_valued: false,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn resolves_through_alias() {
        let config = config();
        assert_eq!(
            resolve_field(&config, "createdOn", FieldUse::Search),
            Some("created_on")
        );
        assert_eq!(
            resolve_field(&config, "categoryName", FieldUse::Search),
            Some("category.name")
        );
    }

    #[test]
    fn resolves_identity_when_whitelisted() {
        let config = config();
        assert_eq!(resolve_field(&config, "name", FieldUse::Search), Some("name"));
    }

    #[test]
    fn search_and_sort_whitelists_are_independent() {
        let config = config();
        assert_eq!(resolve_field(&config, "name", FieldUse::Sort), None);
        assert_eq!(
            resolve_field(&config, "createdOn", FieldUse::Sort),
            Some("created_on")
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let config = config();
        assert_eq!(resolve_field(&config, "password", FieldUse::Search), None);
        assert_eq!(resolve_field(&config, "password", FieldUse::Sort), None);
    }
}
