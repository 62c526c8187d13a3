//! Value rewrites applied before anything reaches the database.

use crate::models::entity::{AttributeValue, EntityType};

/// Replace an empty string bound for a non-nullable numeric column with the
/// column default, or zero when there is none. Anything else is returned
/// unchanged.
pub fn sanitize(entity_type: &EntityType, attribute: &str, value: AttributeValue) -> AttributeValue {
    let is_empty_text = matches!(&value, AttributeValue::Text(text) if text.is_empty());
    if !is_empty_text {
        return value;
    }

    let Some(column) = entity_type.column(attribute) else {
        return value;
    };
    if column.nullable || !column.kind.is_numeric() {
        return value;
    }

    column
        .default
        .clone()
        .or_else(|| column.kind.zero_value())
        .unwrap_or(value)
}

/// Escape HTML special characters, single and double quotes included.
pub fn purge_xss(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            other => escaped.push(other),
        }
    }
    escaped
}
