//! SQL rendering for typed filter predicates.
//!
//! Every operand travels as a bind parameter; the only text interpolated
//! into the SQL is the already-whitelisted column expression and the
//! operator itself.

use sifter_core::filter::{FilterOperator, FilterPredicate, FilterValue};

use super::bind::{push_datetime, push_number, push_text, push_text_array};
use super::BindValue;

/// Render one predicate against a column expression. `None` means the
/// operator/operand combination carries nothing usable and the filter is
/// dropped.
pub(super) fn build_predicate_clause(
    expr: &str,
    predicate: &FilterPredicate,
    bind_params: &mut Vec<BindValue>,
) -> Option<String> {
    use FilterOperator::*;

    match (&predicate.operator, &predicate.value) {
        (Contains, FilterValue::Text(v)) => {
            let idx = push_text(bind_params, format!("%{}%", escape_like_pattern(v)));
            Some(format!("{} ILIKE ${}", expr, idx))
        }
        (NotContains, FilterValue::Text(v)) => {
            let idx = push_text(bind_params, format!("%{}%", escape_like_pattern(v)));
            Some(format!("{} NOT ILIKE ${}", expr, idx))
        }
        (StartsWith, FilterValue::Text(v)) => {
            let idx = push_text(bind_params, format!("{}%", escape_like_pattern(v)));
            Some(format!("{} ILIKE ${}", expr, idx))
        }
        (EndsWith, FilterValue::Text(v)) => {
            let idx = push_text(bind_params, format!("%{}", escape_like_pattern(v)));
            Some(format!("{} ILIKE ${}", expr, idx))
        }

        (Eq, FilterValue::Text(v)) => {
            let idx = push_text(bind_params, v.clone());
            Some(format!("{} = ${}", expr, idx))
        }
        (Eq, FilterValue::Number(n)) => {
            let idx = push_number(bind_params, *n);
            Some(format!("{} = ${}", expr, idx))
        }
        (Ne, FilterValue::Text(v)) => {
            let idx = push_text(bind_params, v.clone());
            Some(format!("{} <> ${}", expr, idx))
        }
        (Ne, FilterValue::Number(n)) => {
            let idx = push_number(bind_params, *n);
            Some(format!("{} <> ${}", expr, idx))
        }

        (op @ (Gt | Gte | Lt | Lte), FilterValue::Number(n)) => {
            let idx = push_number(bind_params, *n);
            Some(format!("{} {} ${}", expr, comparator(op), idx))
        }
        // Lexicographic comparison on the raw operand.
        (op @ (Gt | Gte | Lt | Lte), FilterValue::Text(v)) => {
            let idx = push_text(bind_params, v.clone());
            Some(format!("{} {} ${}", expr, comparator(op), idx))
        }

        (op @ (DateEq | DateNe | DateGt | DateGte | DateLt | DateLte), FilterValue::Date(d)) => {
            let idx = push_datetime(bind_params, *d);
            Some(format!("{} {} ${}", expr, comparator(op), idx))
        }
        (DateBetween, FilterValue::DateRange(start, end)) => {
            let start_idx = push_datetime(bind_params, *start);
            let end_idx = push_datetime(bind_params, *end);
            Some(format!(
                "({e} >= ${} AND {e} <= ${})",
                start_idx,
                end_idx,
                e = expr
            ))
        }

        (In, FilterValue::List(values)) => {
            let idx = push_text_array(bind_params, values.clone());
            Some(format!("{} = ANY(${})", expr, idx))
        }

        _ => None,
    }
}

fn comparator(op: &FilterOperator) -> &'static str {
    use FilterOperator::*;
    match op {
        Gt | DateGt => ">",
        Gte | DateGte => ">=",
        Lt | DateLt => "<",
        Lte | DateLte => "<=",
        DateEq => "=",
        DateNe => "<>",
        _ => unreachable!("comparator called for non-comparison operator"),
    }
}

/// Escape SQL LIKE meta-characters so user input is treated literally.
pub(super) fn escape_like_pattern(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_core::filter::{parse_filter, FieldKind};

    fn clause(expr: &str, raw: &str, kind: FieldKind) -> (String, Vec<BindValue>) {
        let mut binds = Vec::new();
        let predicate = parse_filter(raw, kind).unwrap();
        let sql = build_predicate_clause(expr, &predicate, &mut binds).unwrap();
        (sql, binds)
    }

    #[test]
    fn contains_wraps_operand_in_wildcards() {
        let (sql, binds) = clause("e.name", "cnt:admin", FieldKind::Text);
        assert_eq!(sql, "e.name ILIKE $1");
        assert_eq!(binds, vec![BindValue::Text("%admin%".to_string())]);
    }

    #[test]
    fn like_meta_characters_are_escaped() {
        let (_, binds) = clause("e.name", "cnt:50%_off", FieldKind::Text);
        assert_eq!(binds, vec![BindValue::Text("%50\\%\\_off%".to_string())]);
    }

    #[test]
    fn prefix_and_suffix_operators_place_single_wildcards() {
        let (sql, binds) = clause("e.name", "sw:Adm", FieldKind::Text);
        assert_eq!(sql, "e.name ILIKE $1");
        assert_eq!(binds, vec![BindValue::Text("Adm%".to_string())]);

        let (_, binds) = clause("e.name", "ew:strator", FieldKind::Text);
        assert_eq!(binds, vec![BindValue::Text("%strator".to_string())]);
    }

    #[test]
    fn numeric_comparison_binds_a_number() {
        let (sql, binds) = clause("e.balance", "gte:10.5", FieldKind::Number);
        assert_eq!(sql, "e.balance >= $1");
        assert_eq!(binds, vec![BindValue::Number(10.5)]);
    }

    #[test]
    fn date_between_is_inclusive_on_both_ends() {
        let (sql, binds) = clause(
            "e.created_on",
            "dbetween:2024-01-01,2024-06-30",
            FieldKind::Date,
        );
        assert_eq!(sql, "(e.created_on >= $1 AND e.created_on <= $2)");
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn in_list_binds_a_text_array() {
        let (sql, binds) = clause("e.status", "in:ACTIVE,PENDING", FieldKind::Text);
        assert_eq!(sql, "e.status = ANY($1)");
        assert_eq!(
            binds,
            vec![BindValue::TextArray(vec![
                "ACTIVE".to_string(),
                "PENDING".to_string()
            ])]
        );
    }
}
