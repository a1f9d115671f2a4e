use chrono::NaiveDateTime;

/// Bind values for `sqlx` queries.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    TextArray(Vec<String>),
}

pub(super) fn push_text(bind_params: &mut Vec<BindValue>, value: String) -> usize {
    bind_params.push(BindValue::Text(value));
    bind_params.len()
}

pub(super) fn push_number(bind_params: &mut Vec<BindValue>, value: f64) -> usize {
    bind_params.push(BindValue::Number(value));
    bind_params.len()
}

pub(super) fn push_datetime(bind_params: &mut Vec<BindValue>, value: NaiveDateTime) -> usize {
    bind_params.push(BindValue::DateTime(value));
    bind_params.len()
}

pub(super) fn push_text_array(bind_params: &mut Vec<BindValue>, value: Vec<String>) -> usize {
    bind_params.push(BindValue::TextArray(value));
    bind_params.len()
}
