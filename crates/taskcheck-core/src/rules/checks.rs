//! Predicates shared by the form engines.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use super::dates::{parse_date, parse_time};
use super::{RuleViolations, ViolationCategory};
use crate::extract::{resolve_text, ExtractFn};
use crate::field::{Field, FieldValue, FormSchema};
use crate::forms::{FormDefinition, LessonFields, RuleSettings};

/// Settings and labels of one form, as seen by its engine.
#[derive(Debug, Clone)]
pub(super) struct FormChecks {
    pub form_id: u64,
    pub settings: RuleSettings,
    definition: FormDefinition,
}

/// One task as read by the predicates of a single engine run.
///
/// Configured ids that the form template lacks are recorded here; every
/// predicate reading such a field is skipped while the others still run.
pub(super) struct TaskView<'a> {
    fields: &'a [Field],
    extract: ExtractFn,
    absent: BTreeSet<u64>,
}

impl TaskView<'_> {
    pub fn read(&self, field_id: u64) -> FieldValue {
        (self.extract)(self.fields, field_id)
    }

    pub fn in_template(&self, field_id: u64) -> bool {
        !self.absent.contains(&field_id)
    }
}

impl FormChecks {
    pub fn new(definition: &FormDefinition) -> Self {
        Self {
            form_id: definition.id,
            settings: definition.rules.clone().unwrap_or_default(),
            definition: definition.clone(),
        }
    }

    /// "Label (ID:n)" for messages.
    pub fn describe(&self, field_id: u64) -> String {
        format!("{} (ID:{})", self.definition.label(field_id), field_id)
    }

    pub fn completion_field(&self) -> Option<u64> {
        self.definition
            .attendance
            .as_ref()
            .map(|a| a.completion_field)
    }

    /// Bind a task to this form's template.
    ///
    /// A placeholder template has no field list, so nothing is absent.
    pub fn view<'a>(
        &self,
        schema: &FormSchema,
        fields: &'a [Field],
        extract: ExtractFn,
    ) -> TaskView<'a> {
        let absent: BTreeSet<u64> = if schema.is_placeholder() {
            BTreeSet::new()
        } else {
            self.settings
                .referenced_fields()
                .into_iter()
                .filter(|id| !schema.has_field(*id))
                .collect()
        };
        for field_id in &absent {
            warn!(
                form_id = self.form_id,
                field_id, "Configured field not in form template, dependent checks skipped"
            );
        }
        TaskView {
            fields,
            extract,
            absent,
        }
    }

    /// Teacher, branch and status checks.
    pub fn general(&self, task: &TaskView<'_>, out: &mut RuleViolations) {
        for field_id in [self.settings.teacher_field, self.settings.branch_field]
            .into_iter()
            .flatten()
            .filter(|id| task.in_template(*id))
        {
            if !task.read(field_id).is_filled() {
                out.push(
                    ViolationCategory::General,
                    format!("{} is not filled", self.describe(field_id)),
                );
            }
        }

        if let Some(status_field) = self.settings.status_field.filter(|id| task.in_template(*id)) {
            self.check_status(task, status_field, out);
        }
    }

    fn check_status(&self, task: &TaskView<'_>, field_id: u64, out: &mut RuleViolations) {
        let Some(status) = resolve_text(&task.read(field_id)) else {
            out.push(
                ViolationCategory::General,
                format!("{} is not filled", self.describe(field_id)),
            );
            return;
        };

        let valid = &self.settings.valid_statuses;
        if !valid.is_empty() && !valid.iter().any(|v| v == &status) {
            out.push(
                ViolationCategory::General,
                format!(
                    "{} is '{}', expected one of: {}",
                    self.describe(field_id),
                    status,
                    valid.join(", ")
                ),
            );
        }
    }

    /// Lessons whose date and answer fields exist in the template.
    pub fn checkable_lessons(&self, task: &TaskView<'_>) -> Vec<&LessonFields> {
        self.settings
            .lessons
            .iter()
            .filter(|l| task.in_template(l.date_field) && task.in_template(l.answer_field))
            .collect()
    }

    /// Lessons scheduled before `cutoff` whose answer is still blank.
    pub fn overdue_lessons(
        &self,
        task: &TaskView<'_>,
        cutoff: NaiveDateTime,
        out: &mut RuleViolations,
    ) {
        for lesson in self.checkable_lessons(task) {
            let time_field = lesson.time_field.filter(|id| task.in_template(*id));
            let Some(scheduled) = lesson_start(task, lesson.date_field, time_field) else {
                debug!(
                    form_id = self.form_id,
                    date_field = lesson.date_field,
                    "lesson date missing or unparsable"
                );
                continue;
            };

            if scheduled >= cutoff || task.read(lesson.answer_field).is_filled() {
                continue;
            }

            let when = if time_field.is_some() {
                scheduled.format("%Y-%m-%d at %H:%M").to_string()
            } else {
                scheduled.format("%Y-%m-%d").to_string()
            };
            out.push(
                ViolationCategory::Rule3,
                format!(
                    "{} is not filled although the lesson was on {}",
                    self.describe(lesson.answer_field),
                    when
                ),
            );
        }
    }
}

/// Lesson start; midnight when no time is configured or filled.
fn lesson_start(task: &TaskView<'_>, date_field: u64, time_field: Option<u64>) -> Option<NaiveDateTime> {
    let date = parse_date(&task.read(date_field))?;
    let time = time_field
        .and_then(|id| parse_time(&task.read(id)))
        .unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}
