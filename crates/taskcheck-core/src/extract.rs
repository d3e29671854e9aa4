//! Field value extraction.
//!
//! One function owns every precedence decision for turning a raw field
//! value into a [`FieldValue`]:
//!
//! 1. `null` or absent id → `Missing`
//! 2. plain scalar → `Text`
//! 3. structure with a `checkmark` string → `Checkbox`, regardless of
//!    any co-present keys
//! 4. structure with `text`, `value` or `name` strings (in that order) →
//!    `Text` of the first non-empty one
//! 5. anything else → `Raw`
//!
//! Nothing here returns an error. Unexpected shapes degrade to `Raw`.

use serde_json::Value;

use crate::field::{Field, FieldValue};

/// Signature of an extraction function.
///
/// The analyzer and the attendance controller receive one of these at
/// construction instead of looking one up per call.
pub type ExtractFn = fn(&[Field], u64) -> FieldValue;

/// Keys consulted for textual content, in priority order.
const TEXT_KEYS: [&str; 3] = ["text", "value", "name"];

/// Extract the normalized value of `field_id` from a task's fields.
pub fn extract(fields: &[Field], field_id: u64) -> FieldValue {
    match find_raw(fields, field_id) {
        Some(raw) => normalize(raw),
        None => FieldValue::Missing,
    }
}

/// Locate the raw value of `field_id`.
///
/// The first field with a matching id wins. When a field does not
/// match, its value is searched for nested section fields
/// (`value.fields`) and table rows (`value.items[].fields`), then its own
/// child list (`fields`), before moving on to the next field. Nested
/// matches holding `null` do not end the search.
pub fn find_raw(fields: &[Field], field_id: u64) -> Option<&Value> {
    for field in fields {
        if field.id == field_id {
            return Some(&field.value);
        }
        if let Some(found) = find_nested(&field.value, field_id) {
            return Some(found);
        }
        if let Some(found) = find_raw(&field.subfields, field_id).filter(|v| !v.is_null()) {
            return Some(found);
        }
    }
    None
}

fn find_in_records(records: &[Value], field_id: u64) -> Option<&Value> {
    for record in records {
        if record.get("id").and_then(Value::as_u64) == Some(field_id) {
            return record.get("value").filter(|v| !v.is_null());
        }
        if let Some(value) = record.get("value") {
            if let Some(found) = find_nested(value, field_id) {
                return Some(found);
            }
        }
        if let Some(children) = record.get("fields").and_then(Value::as_array) {
            if let Some(found) = find_in_records(children, field_id) {
                return Some(found);
            }
        }
    }
    None
}

/// Normalize a raw value.
pub fn normalize(raw: &Value) -> FieldValue {
    match raw {
        Value::Null => FieldValue::Missing,
        Value::String(text) => FieldValue::Text(text.clone()),
        Value::Number(n) => FieldValue::Text(n.to_string()),
        Value::Bool(b) => FieldValue::Text(b.to_string()),
        Value::Array(_) => FieldValue::Raw(raw.clone()),
        Value::Object(map) => {
            if let Some(mark) = map.get("checkmark") {
                return match mark.as_str() {
                    Some(state) => FieldValue::Checkbox(state.to_string()),
                    None => FieldValue::Raw(raw.clone()),
                };
            }

            let texts: Vec<&str> = TEXT_KEYS
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_str))
                .collect();

            if texts.is_empty() {
                return FieldValue::Raw(raw.clone());
            }

            let chosen = texts
                .iter()
                .find(|text| !text.trim().is_empty())
                .copied()
                .unwrap_or_default();
            FieldValue::Text(chosen.to_string())
        }
    }
}

/// Best-effort display text for catalog, choice and person values.
///
/// Covers shapes the normalizer deliberately leaves as `Raw`:
/// `choice_names[0]`, `values[0]`, `rows[0][0]` and
/// `first_name`/`last_name` pairs.
pub fn resolve_text(value: &FieldValue) -> Option<String> {
    let text = match value {
        FieldValue::Text(text) => Some(text.trim().to_string()),
        FieldValue::Raw(raw) => resolve_raw_text(raw),
        FieldValue::Missing | FieldValue::Checkbox(_) => None,
    };
    text.filter(|t| !t.is_empty())
}

fn resolve_raw_text(raw: &Value) -> Option<String> {
    let first_string = |key: &str| {
        raw.get(key)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
    };

    if let Some(choice) = first_string("choice_names") {
        return Some(choice);
    }
    if let Some(value) = first_string("values") {
        return Some(value);
    }
    if let Some(cell) = raw
        .get("rows")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_array)
        .and_then(|row| row.first())
        .and_then(Value::as_str)
    {
        return Some(cell.trim().to_string());
    }

    let first = raw.get("first_name").and_then(Value::as_str).unwrap_or_default();
    let last = raw.get("last_name").and_then(Value::as_str).unwrap_or_default();
    let full = format!("{} {}", first.trim(), last.trim()).trim().to_string();
    if full.is_empty() {
        None
    } else {
        Some(full)
    }
}
