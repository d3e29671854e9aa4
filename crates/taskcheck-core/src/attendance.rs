//! Attendance control.
//!
//! Decides whether a task represents a genuine attendance problem.
//! Evaluation order is fixed:
//!
//! 1. Unknown form → no problem
//! 2. Completion marker set → no problem, control resolved
//! 3. Exclusion status matched → no problem, control resolved
//! 4. Every check field answered "No" becomes a problem detail
//!
//! Steps 2 and 3 short-circuit: check fields are never inspected once
//! the control is resolved.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::extract::{resolve_text, ExtractFn};
use crate::field::{Field, FieldValue};
use crate::forms::{FormDefinition, FormRegistry, FormRuleConfig};

lazy_static! {
    static ref LESSON_ORDINAL_EN: Regex =
        Regex::new(r"(?i)\b([1-9])(st|nd|rd|th)\s+lesson\b").unwrap();
    static ref LESSON_ORDINAL_RU: Regex = Regex::new(r"(?i)([1-9])-е\s+занятие").unwrap();
}

const POSITIVE_ANSWERS: [&str; 3] = ["yes", "да", "checked"];
const NEGATIVE_ANSWERS: [&str; 2] = ["no", "нет"];

/// Why a control was resolved without inspecting the check fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlOverride {
    /// The completion marker is set
    Completed { marker: String },

    /// The exclusion field matched a configured value
    Excluded { status: String, matched: String },
}

impl fmt::Display for ControlOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOverride::Completed { marker } => write!(
                f,
                "completion marker set ({}): control not required",
                marker
            ),
            ControlOverride::Excluded { status, matched } => write!(
                f,
                "exclusion status '{}' matches '{}': control not required",
                status, matched
            ),
        }
    }
}

/// Outcome of the attendance control.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendanceVerdict {
    /// True iff `problem_details` is non-empty
    pub has_problem: bool,

    /// Lessons with a negative answer, comma-separated
    pub lesson_summary: String,

    /// "<field label>: <value>" per negative answer
    pub problem_details: Vec<String>,

    /// Set when an override resolved the control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<ControlOverride>,
}

impl AttendanceVerdict {
    /// No problem and nothing to say.
    pub fn clear() -> Self {
        Self::default()
    }

    fn resolved(by: ControlOverride) -> Self {
        Self {
            resolved_by: Some(by),
            ..Self::default()
        }
    }

    /// Human-readable reason when the control was resolved.
    pub fn reason(&self) -> Option<String> {
        self.resolved_by.as_ref().map(ToString::to_string)
    }
}

/// Attendance controller over a form registry.
pub struct AttendanceController {
    registry: Arc<FormRegistry>,
    extract: ExtractFn,
}

impl AttendanceController {
    pub fn new(registry: Arc<FormRegistry>, extract: ExtractFn) -> Self {
        Self { registry, extract }
    }

    /// Evaluate the control for a task of `form_id`.
    ///
    /// Pure: the same fields and form id always give the same verdict.
    pub fn evaluate(&self, fields: &[Field], form_id: u64) -> AttendanceVerdict {
        let Some(definition) = self.registry.definition(form_id) else {
            return AttendanceVerdict::clear();
        };
        let Some(config) = definition.attendance.as_ref() else {
            return AttendanceVerdict::clear();
        };
        evaluate_control(config, definition, fields, self.extract)
    }
}

/// Run the control with an explicit configuration.
pub fn evaluate_control(
    config: &FormRuleConfig,
    definition: &FormDefinition,
    fields: &[Field],
    extract: ExtractFn,
) -> AttendanceVerdict {
    let completion = extract(fields, config.completion_field);
    if is_completion_marker(&completion) {
        debug!(form_id = definition.id, field_id = config.completion_field, "completion marker set");
        return AttendanceVerdict::resolved(ControlOverride::Completed {
            marker: completion.to_string(),
        });
    }

    if let Some(exclusion_field) = config.exclusion_field {
        if let Some(status) = resolve_text(&extract(fields, exclusion_field)) {
            let lowered = status.to_lowercase();
            if let Some(matched) = config
                .exclusion_values
                .iter()
                .find(|v| lowered.contains(&v.to_lowercase()))
            {
                debug!(form_id = definition.id, %status, "exclusion status matched");
                return AttendanceVerdict::resolved(ControlOverride::Excluded {
                    status,
                    matched: matched.clone(),
                });
            }
        }
    }

    let mut problem_details = Vec::new();
    let mut lessons: Vec<String> = Vec::new();

    for check in &config.check_fields {
        let value = extract(fields, check.id);
        if !is_negative_answer(&value) {
            continue;
        }

        let label = definition.label(check.id);
        problem_details.push(format!("{}: {}", label, value));

        let lesson = check
            .lesson
            .clone()
            .or_else(|| lesson_from_label(&label));
        if let Some(lesson) = lesson {
            if !lessons.contains(&lesson) {
                lessons.push(lesson);
            }
        }
    }

    AttendanceVerdict {
        has_problem: !problem_details.is_empty(),
        lesson_summary: lessons.join(", "),
        problem_details,
        resolved_by: None,
    }
}

/// Positive completion: checked checkbox, yes/да text, or a raw
/// `{checked: true}` / `{value: true}` structure.
pub fn is_completion_marker(value: &FieldValue) -> bool {
    match value {
        FieldValue::Checkbox(_) => value.is_checked(),
        FieldValue::Text(_) => value
            .normalized_text()
            .is_some_and(|t| POSITIVE_ANSWERS.contains(&t.as_str())),
        FieldValue::Raw(raw) => {
            raw.get("checked") == Some(&Value::Bool(true))
                || raw.get("value") == Some(&Value::Bool(true))
        }
        FieldValue::Missing => false,
    }
}

/// "No"/"Нет" answer, case-insensitive, plain or nested text.
pub fn is_negative_answer(value: &FieldValue) -> bool {
    value
        .normalized_text()
        .is_some_and(|t| NEGATIVE_ANSWERS.contains(&t.as_str()))
}

/// Lesson ordinal named in a field label ("Attended 1st lesson?").
pub fn lesson_from_label(label: &str) -> Option<String> {
    if let Some(caps) = LESSON_ORDINAL_EN.captures(label) {
        return Some(format!("{}{} lesson", &caps[1], caps[2].to_lowercase()));
    }
    LESSON_ORDINAL_RU
        .captures(label)
        .map(|caps| format!("{}-е занятие", &caps[1]))
}
