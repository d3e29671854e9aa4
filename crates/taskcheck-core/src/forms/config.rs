//! Forms configuration parsing from YAML/JSON.
//!
//! A document is first checked against schema/forms.schema.json, then
//! deserialized, then checked for cross-references the schema cannot
//! express.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Built-in configuration shipped with the crate.
const BUILTIN_FORMS_YAML: &str = include_str!("../../../../config/forms.yaml");

const FORMS_SCHEMA_JSON: &str = include_str!("../../../../schema/forms.schema.json");

static FORMS_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors that can occur when loading forms configuration.
#[derive(Error, Debug)]
pub enum FormsConfigError {
    #[error("Failed to read forms file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Forms schema unusable: {0}")]
    SchemaUnavailable(String),

    #[error("Forms configuration does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Forms configuration validation failed: {0}")]
    ValidationError(String),
}

/// A check field inspected for negative attendance answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckField {
    pub id: u64,

    /// Lesson this field reports on (e.g. "1st lesson")
    #[serde(default)]
    pub lesson: Option<String>,
}

/// Attendance control settings for one form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormRuleConfig {
    /// Fields inspected for "No" answers, in order
    pub check_fields: Vec<CheckField>,

    /// Field whose positive value suppresses the control
    pub completion_field: u64,

    /// Field whose text may exclude the task from control
    #[serde(default)]
    pub exclusion_field: Option<u64>,

    /// Case-insensitive substrings of the exclusion field that suppress checks
    #[serde(default)]
    pub exclusion_values: Vec<String>,
}

/// Human-readable label for a field id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldLabel {
    pub id: u64,
    pub label: String,
}

/// Fields that describe one scheduled lesson.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LessonFields {
    pub date_field: u64,

    #[serde(default)]
    pub time_field: Option<u64>,

    pub answer_field: u64,
}

/// Settings consumed by a form's rule engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuleSettings {
    #[serde(default)]
    pub teacher_field: Option<u64>,

    #[serde(default)]
    pub branch_field: Option<u64>,

    #[serde(default)]
    pub status_field: Option<u64>,

    #[serde(default)]
    pub valid_statuses: Vec<String>,

    #[serde(default)]
    pub lessons: Vec<LessonFields>,
}

impl RuleSettings {
    /// Every field id referenced by these settings.
    pub fn referenced_fields(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = [self.teacher_field, self.branch_field, self.status_field]
            .into_iter()
            .flatten()
            .collect();
        for lesson in &self.lessons {
            ids.push(lesson.date_field);
            ids.extend(lesson.time_field);
            ids.push(lesson.answer_field);
        }
        ids
    }
}

/// Configuration of one form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormDefinition {
    pub id: u64,

    /// Display name used when the platform has none
    pub name: String,

    #[serde(default)]
    pub attendance: Option<FormRuleConfig>,

    /// Important fields, in display order
    #[serde(default)]
    pub field_labels: Vec<FieldLabel>,

    #[serde(default)]
    pub rules: Option<RuleSettings>,
}

impl FormDefinition {
    /// Label for a field id, falling back to a generated one.
    pub fn label(&self, field_id: u64) -> String {
        self.field_labels
            .iter()
            .find(|l| l.id == field_id)
            .map(|l| l.label.clone())
            .unwrap_or_else(|| format!("Field {}", field_id))
    }
}

/// A full forms configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormsConfig {
    pub config_version: String,

    #[serde(default)]
    pub forms: Vec<FormDefinition>,
}

impl FormsConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, FormsConfigError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, FormsConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse configuration from a file; `.json` files are read as JSON,
    /// anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FormsConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// The configuration embedded in the crate.
    pub fn builtin() -> Result<Self, FormsConfigError> {
        Self::from_yaml(BUILTIN_FORMS_YAML)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, FormsConfigError> {
        check_schema(&value)?;
        let config: FormsConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks the schema cannot express.
    fn validate(&self) -> Result<(), FormsConfigError> {
        let mut seen_forms = HashSet::new();

        for form in &self.forms {
            if !seen_forms.insert(form.id) {
                return Err(FormsConfigError::ValidationError(format!(
                    "Duplicate form ID: {}",
                    form.id
                )));
            }

            let mut seen_labels = HashSet::new();
            for label in &form.field_labels {
                if !seen_labels.insert(label.id) {
                    return Err(FormsConfigError::ValidationError(format!(
                        "Duplicate label for field {} in form {}",
                        label.id, form.id
                    )));
                }
            }

            if let Some(attendance) = &form.attendance {
                let mut seen_checks = HashSet::new();
                for check in &attendance.check_fields {
                    if !seen_checks.insert(check.id) {
                        return Err(FormsConfigError::ValidationError(format!(
                            "Duplicate check field {} in form {}",
                            check.id, form.id
                        )));
                    }
                }

                if attendance.exclusion_field.is_some() && attendance.exclusion_values.is_empty() {
                    return Err(FormsConfigError::ValidationError(format!(
                        "Form {} sets exclusion_field without exclusion_values",
                        form.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Every schema violation of `value`, as "<path>: <message>".
fn check_schema(value: &serde_json::Value) -> Result<(), FormsConfigError> {
    let validator = FORMS_SCHEMA
        .get_or_init(|| {
            let schema: serde_json::Value =
                serde_json::from_str(FORMS_SCHEMA_JSON).map_err(|e| e.to_string())?;
            jsonschema::validator_for(&schema).map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| FormsConfigError::SchemaUnavailable(e.clone()))?;

    let violations: Vec<String> = validator
        .iter_errors(value)
        .map(|e| {
            let path = e.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            format!("{}: {}", path, e)
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(FormsConfigError::SchemaError(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINIMAL: &str = r#"
config_version: "1.0"
forms:
  - id: 792300
    name: "Trial"
    attendance:
      check_fields:
        - { id: 183, lesson: "1st lesson" }
        - { id: 198 }
      completion_field: 187
    field_labels:
      - { id: 183, label: "Attended 1st lesson?" }
"#;

    #[test]
    fn test_parse_minimal() {
        let config = FormsConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.forms.len(), 1);

        let form = &config.forms[0];
        let attendance = form.attendance.as_ref().unwrap();
        assert_eq!(attendance.completion_field, 187);
        assert_eq!(attendance.check_fields[0].lesson.as_deref(), Some("1st lesson"));
        assert_eq!(attendance.check_fields[1].lesson, None);
        assert!(attendance.exclusion_field.is_none());
        assert!(form.rules.is_none());
    }

    #[test]
    fn test_label_fallback() {
        let config = FormsConfig::from_yaml(MINIMAL).unwrap();
        let form = &config.forms[0];
        assert_eq!(form.label(183), "Attended 1st lesson?");
        assert_eq!(form.label(198), "Field 198");
    }

    #[test]
    fn test_builtin_config_loads() {
        let config = FormsConfig::builtin().unwrap();
        let ids: Vec<u64> = config.forms.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![2304918, 792300]);

        let returning = &config.forms[0];
        let attendance = returning.attendance.as_ref().unwrap();
        assert_eq!(attendance.exclusion_field, Some(25));
        assert!(attendance.exclusion_values.iter().any(|v| v == "not coming"));
    }

    #[test]
    fn test_duplicate_form_ids_rejected() {
        let yaml = r#"
config_version: "1.0"
forms:
  - { id: 1, name: "A" }
  - { id: 1, name: "B" }
"#;
        assert!(matches!(
            FormsConfig::from_yaml(yaml),
            Err(FormsConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_exclusion_field_needs_values() {
        let yaml = r#"
config_version: "1.0"
forms:
  - id: 1
    name: "A"
    attendance:
      check_fields: [ { id: 2 } ]
      completion_field: 3
      exclusion_field: 4
"#;
        assert!(matches!(
            FormsConfig::from_yaml(yaml),
            Err(FormsConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_schema_violation_reported() {
        let yaml = r#"
config_version: "1.0"
forms:
  - id: 1
"#;
        assert!(matches!(
            FormsConfig::from_yaml(yaml),
            Err(FormsConfigError::SchemaError(_))
        ));
    }

    fn schema_violations(json: serde_json::Value) -> Vec<String> {
        match check_schema(&json) {
            Err(FormsConfigError::SchemaError(violations)) => violations,
            other => panic!("expected schema violations, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_accepts_minimal_document() {
        let value = json!({ "config_version": "1.0", "forms": [ { "id": 1, "name": "Form" } ] });
        assert!(check_schema(&value).is_ok());
    }

    #[test]
    fn test_schema_version_is_required_and_dotted() {
        assert!(!schema_violations(json!({ "forms": [] })).is_empty());
        assert!(!schema_violations(json!({ "config_version": "one", "forms": [] })).is_empty());
    }

    #[test]
    fn test_schema_violations_carry_paths() {
        let violations = schema_violations(json!({
            "config_version": "1.0",
            "forms": [ { "id": 1, "name": "Form", "field_labels": [ { "id": 0, "label": "x" } ] } ]
        }));
        assert!(violations.iter().any(|v| v.starts_with("/forms/0/field_labels/0/id")));
    }

    #[test]
    fn test_schema_rejects_unknown_keys_and_partial_attendance() {
        assert!(!schema_violations(json!({
            "config_version": "1.0",
            "forms": [ { "id": 1, "name": "Form", "colour": "red" } ]
        }))
        .is_empty());
        assert!(!schema_violations(json!({
            "config_version": "1.0",
            "forms": [ { "id": 1, "name": "Form", "attendance": { "completion_field": 3 } } ]
        }))
        .is_empty());
    }

    #[test]
    fn test_json_config() {
        let json = r#"{ "config_version": "1.0", "forms": [ { "id": 9, "name": "Nine" } ] }"#;
        let config = FormsConfig::from_json(json).unwrap();
        assert_eq!(config.forms[0].name, "Nine");
    }

    #[test]
    fn test_referenced_fields() {
        let settings = RuleSettings {
            teacher_field: Some(1),
            branch_field: None,
            status_field: Some(3),
            valid_statuses: vec![],
            lessons: vec![LessonFields {
                date_field: 10,
                time_field: Some(11),
                answer_field: 12,
            }],
        };
        assert_eq!(settings.referenced_fields(), vec![1, 3, 10, 11, 12]);
    }
}
