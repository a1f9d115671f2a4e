//! Filter expression grammar
//!
//! Column filters arrive as compact `operator:value` strings (`gte:100`,
//! `dbetween:2024-01-01,2024-06-30`, `in:ACTIVE,PENDING`). Parsing turns
//! them into typed predicates; anything unparseable degrades to a
//! substring match or is dropped, never a request-level failure.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;

/// Declared value kind of a storage field, consulted when typing operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Case-insensitive substring match (the default).
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    DateEq,
    DateNe,
    DateGt,
    DateGte,
    DateLt,
    DateLte,
    /// Inclusive date range; operand is `start,end`.
    DateBetween,
    /// Membership in a comma-separated value list.
    In,
}

impl FilterOperator {
    /// Match a raw operator token. Tokens are case-sensitive; anything
    /// unrecognized is treated by the caller as part of a plain operand.
    pub fn parse_token(token: &str) -> Option<Self> {
        match token {
            "cnt" => Some(Self::Contains),
            "ncnt" => Some(Self::NotContains),
            "sw" => Some(Self::StartsWith),
            "ew" => Some(Self::EndsWith),
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "deq" => Some(Self::DateEq),
            "dne" => Some(Self::DateNe),
            "dgt" => Some(Self::DateGt),
            "dgte" => Some(Self::DateGte),
            "dlt" => Some(Self::DateLt),
            "dlte" => Some(Self::DateLte),
            "dbetween" => Some(Self::DateBetween),
            "in" => Some(Self::In),
            _ => None,
        }
    }
}

/// Typed operand of a parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
    DateRange(NaiveDateTime, NaiveDateTime),
    List(Vec<String>),
}

/// A parsed, typed predicate descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl FilterPredicate {
    fn contains(operand: &str) -> Self {
        Self {
            operator: FilterOperator::Contains,
            value: FilterValue::Text(operand.to_string()),
        }
    }
}

/// Parse a raw filter expression against the field's declared kind.
///
/// Returns `None` when the expression carries nothing usable (empty input,
/// unparseable date operand, empty `in` list); the caller drops the filter
/// and logs. Unknown operator tokens are not an error: the whole string
/// becomes a substring-match operand.
pub fn parse_filter(raw: &str, kind: FieldKind) -> Option<FilterPredicate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let Some((token, rest)) = raw.split_once(':') else {
        return bare_operand(raw, kind);
    };

    let Some(operator) = FilterOperator::parse_token(token) else {
        return Some(FilterPredicate::contains(raw));
    };

    typed_operand(operator, rest, kind)
}

/// No `operator:` prefix: the whole string is the operand. Strings match
/// by substring, numbers by equality, dates by day equality.
fn bare_operand(raw: &str, kind: FieldKind) -> Option<FilterPredicate> {
    match kind {
        FieldKind::Text | FieldKind::Unknown => Some(FilterPredicate::contains(raw)),
        FieldKind::Number => match raw.parse::<f64>() {
            Ok(n) => Some(FilterPredicate {
                operator: FilterOperator::Eq,
                value: FilterValue::Number(n),
            }),
            Err(_) => Some(FilterPredicate::contains(raw)),
        },
        FieldKind::Date => parse_date_cached(raw).map(|d| FilterPredicate {
            operator: FilterOperator::DateEq,
            value: FilterValue::Date(d),
        }),
    }
}

fn typed_operand(operator: FilterOperator, rest: &str, kind: FieldKind) -> Option<FilterPredicate> {
    use FilterOperator::*;

    let value = match operator {
        Contains | NotContains | StartsWith | EndsWith => FilterValue::Text(rest.to_string()),

        Eq | Ne => match kind {
            FieldKind::Number => rest
                .trim()
                .parse::<f64>()
                .map(FilterValue::Number)
                .unwrap_or_else(|_| FilterValue::Text(rest.to_string())),
            _ => FilterValue::Text(rest.to_string()),
        },

        // Numeric when declared or detected; otherwise the comparison is
        // lexicographic on the raw operand.
        Gt | Gte | Lt | Lte => match kind {
            FieldKind::Number | FieldKind::Unknown => match rest.trim().parse::<f64>() {
                Ok(n) => FilterValue::Number(n),
                Err(_) => FilterValue::Text(rest.to_string()),
            },
            _ => FilterValue::Text(rest.to_string()),
        },

        DateEq | DateNe | DateGt | DateGte | DateLt | DateLte => {
            FilterValue::Date(parse_date_cached(rest.trim())?)
        }

        DateBetween => {
            let (start, end) = rest.split_once(',')?;
            FilterValue::DateRange(
                parse_date_cached(start.trim())?,
                parse_date_cached(end.trim())?,
            )
        }

        In => {
            let items: Vec<String> = rest
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if items.is_empty() {
                return None;
            }
            FilterValue::List(items)
        }
    };

    Some(FilterPredicate { operator, value })
}

lazy_static! {
    /// Process-wide memo for date-format probing, keyed by the raw operand.
    /// Entries are append-only and live for the process lifetime; the set of
    /// distinct date strings seen in practice is small.
    static ref DATE_PARSE_CACHE: RwLock<HashMap<String, Option<NaiveDateTime>>> =
        RwLock::new(HashMap::new());
}

/// Parse a date operand, memoizing the result of format probing.
pub fn parse_date_cached(raw: &str) -> Option<NaiveDateTime> {
    if let Some(hit) = DATE_PARSE_CACHE.read().unwrap().get(raw) {
        return *hit;
    }
    tracing::debug!("Date parse cache miss for '{}', probing formats", raw);
    let parsed = parse_date(raw);
    DATE_PARSE_CACHE.write().unwrap().insert(raw.to_string(), parsed);
    parsed
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    // Formats are probed in priority order; the first hit wins.
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(datetime);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}
