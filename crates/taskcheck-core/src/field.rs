//! Task, field and form-schema model.
//!
//! Platform payloads are loosely typed: field records may be malformed,
//! values shift between scalars and nested structures. Decoding here is
//! lenient and never fails on a single bad record; normalization of the
//! values themselves lives in [`crate::extract`].

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A single named slot on a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    /// Identity within the task's field list
    pub id: u64,

    /// Display name as sent by the platform
    #[serde(default)]
    pub name: String,

    /// Raw value, any shape
    #[serde(default)]
    pub value: Value,

    /// Child fields carried next to the value by some field types
    #[serde(default, rename = "fields", skip_serializing_if = "Vec::is_empty")]
    pub subfields: Vec<Field>,
}

impl Field {
    pub fn new(id: u64, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id,
            name: name.into(),
            value: value.into(),
            subfields: Vec::new(),
        }
    }

    pub fn with_subfields(mut self, subfields: Vec<Field>) -> Self {
        self.subfields = subfields;
        self
    }

    /// Decode a field record, returning `None` when it has no integer id.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let object = raw.as_object()?;
        let id = object.get("id")?.as_u64()?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let value = object.get("value").cloned().unwrap_or(Value::Null);
        let subfields = object
            .get("fields")
            .map(Self::list_from_value)
            .unwrap_or_default();

        Some(Self {
            id,
            name,
            value,
            subfields,
        })
    }

    /// Decode a list of field records, skipping malformed entries.
    pub fn list_from_value(raw: &Value) -> Vec<Self> {
        raw.as_array()
            .map(|items| items.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }

    /// Display name, falling back to the id when the platform sent none.
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Field {}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// Normalized semantic value of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// No field with that id, or an explicit null
    Missing,

    /// Checkbox marker with its verbatim state ("checked", "unchecked", ...)
    Checkbox(String),

    /// Plain or nested text
    Text(String),

    /// Structure without a recognized key, kept for later inspection
    Raw(Value),
}

impl FieldValue {
    /// Text content, if this value is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Trimmed, lowercased text content.
    pub fn normalized_text(&self) -> Option<String> {
        self.as_text().map(|text| text.trim().to_lowercase())
    }

    /// True for a checkbox whose state is exactly "checked".
    pub fn is_checked(&self) -> bool {
        matches!(self, FieldValue::Checkbox(state) if state == "checked")
    }

    /// Whether the field carries any answer at all.
    ///
    /// Blank text and empty structures count as unfilled; any checkbox
    /// state counts as filled.
    pub fn is_filled(&self) -> bool {
        match self {
            FieldValue::Missing => false,
            FieldValue::Checkbox(_) => true,
            FieldValue::Text(text) => !text.trim().is_empty(),
            FieldValue::Raw(Value::Object(map)) => !map.is_empty(),
            FieldValue::Raw(Value::Array(items)) => !items.is_empty(),
            FieldValue::Raw(Value::Null) => false,
            FieldValue::Raw(_) => true,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Missing => write!(f, "(missing)"),
            FieldValue::Checkbox(state) => write!(f, "[checkbox: {}]", state),
            FieldValue::Text(text) if text.is_empty() => write!(f, "(empty)"),
            FieldValue::Text(text) => write!(f, "{}", text),
            FieldValue::Raw(value) => write!(f, "{}", value),
        }
    }
}

// Serialized close to the wire shape: null, {"checkmark": ..}, "text", raw.
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Missing => serializer.serialize_none(),
            FieldValue::Checkbox(state) => {
                serde_json::json!({ "checkmark": state }).serialize(serializer)
            }
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Raw(value) => value.serialize(serializer),
        }
    }
}

/// A task fetched from the platform.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Task {
    pub id: u64,

    /// Form (template) the task was created from
    pub form_id: Option<u64>,

    pub title: String,

    pub fields: Vec<Field>,
}

impl Task {
    /// Decode the platform's task object.
    ///
    /// Only the task id is mandatory. The title falls back from `subject`
    /// to `text` to a generated one.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let id = raw.get("id")?.as_u64()?;
        let form_id = raw.get("form_id").and_then(Value::as_u64);

        let title = ["subject", "text"]
            .iter()
            .filter_map(|key| raw.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Task #{}", id));

        let fields = raw
            .get("fields")
            .map(Field::list_from_value)
            .unwrap_or_default();

        Some(Self {
            id,
            form_id,
            title,
            fields,
        })
    }
}

/// Field description from a form template.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SchemaField {
    pub id: u64,
    pub name: String,
    pub kind: Option<String>,
}

/// Form metadata as returned by the platform.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FormSchema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}

impl FormSchema {
    /// Schema used when the platform returned no metadata.
    pub fn placeholder(form_id: u64) -> Self {
        Self {
            name: format!("Form {}", form_id),
            fields: Vec::new(),
        }
    }

    /// Decode form metadata. Nested section fields (`info.fields`) are
    /// flattened into the list.
    pub fn from_value(form_id: u64, raw: &Value) -> Self {
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Form {}", form_id));

        let mut fields = Vec::new();
        if let Some(list) = raw.get("fields") {
            collect_schema_fields(list, &mut fields);
        }

        Self { name, fields }
    }

    /// Whether the template declares a field with this id.
    pub fn has_field(&self, field_id: u64) -> bool {
        self.fields.iter().any(|f| f.id == field_id)
    }

    pub fn is_placeholder(&self) -> bool {
        self.fields.is_empty()
    }
}

fn collect_schema_fields(list: &Value, out: &mut Vec<SchemaField>) {
    let Some(items) = list.as_array() else {
        return;
    };

    for item in items {
        if let Some(id) = item.get("id").and_then(Value::as_u64) {
            out.push(SchemaField {
                id,
                name: item
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind: item.get("type").and_then(Value::as_str).map(str::to_string),
            });
        }

        if let Some(nested) = item.get("info").and_then(|info| info.get("fields")) {
            collect_schema_fields(nested, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_list_skips_malformed_records() {
        let raw = json!([
            { "id": 1, "name": "A", "value": "x" },
            "not a record",
            { "name": "no id" },
            { "id": "7", "name": "string id" },
            { "id": 2 }
        ]);

        let fields = Field::list_from_value(&raw);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], Field::new(1, "A", "x"));
        assert_eq!(fields[1].value, Value::Null);
        assert_eq!(fields[1].display_name(), "Field 2");
    }

    #[test]
    fn test_task_title_fallbacks() {
        let with_subject = Task::from_value(&json!({ "id": 5, "subject": "Ivanov", "text": "t" })).unwrap();
        assert_eq!(with_subject.title, "Ivanov");

        let with_text = Task::from_value(&json!({ "id": 5, "subject": "  ", "text": "Body" })).unwrap();
        assert_eq!(with_text.title, "Body");

        let bare = Task::from_value(&json!({ "id": 5 })).unwrap();
        assert_eq!(bare.title, "Task #5");
        assert_eq!(bare.form_id, None);
        assert!(bare.fields.is_empty());
    }

    #[test]
    fn test_task_requires_id() {
        assert!(Task::from_value(&json!({ "form_id": 1 })).is_none());
    }

    #[test]
    fn test_schema_flattens_sections() {
        let raw = json!({
            "name": "Trial",
            "fields": [
                { "id": 1, "type": "title", "name": "Section", "info": {
                    "fields": [ { "id": 183, "type": "multiple_choice", "name": "Attended?" } ]
                }},
                { "id": 187, "type": "checkmark", "name": "Studying" }
            ]
        });

        let schema = FormSchema::from_value(792300, &raw);
        assert_eq!(schema.name, "Trial");
        assert!(schema.has_field(183));
        assert!(schema.has_field(187));
        assert!(!schema.has_field(999));
    }

    #[test]
    fn test_schema_placeholder_name() {
        let schema = FormSchema::from_value(42, &json!({}));
        assert_eq!(schema.name, "Form 42");
        assert!(schema.is_placeholder());
    }

    #[test]
    fn test_field_value_serializes_to_wire_shape() {
        assert_eq!(serde_json::to_value(FieldValue::Missing).unwrap(), Value::Null);
        assert_eq!(
            serde_json::to_value(FieldValue::Checkbox("checked".into())).unwrap(),
            json!({ "checkmark": "checked" })
        );
        assert_eq!(serde_json::to_value(FieldValue::Text("No".into())).unwrap(), json!("No"));
    }

    #[test]
    fn test_is_filled() {
        assert!(!FieldValue::Missing.is_filled());
        assert!(!FieldValue::Text("   ".into()).is_filled());
        assert!(FieldValue::Checkbox("unchecked".into()).is_filled());
        assert!(!FieldValue::Raw(json!({})).is_filled());
        assert!(FieldValue::Raw(json!({ "choice_id": 2 })).is_filled());
    }
}
