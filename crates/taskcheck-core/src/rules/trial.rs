//! Rules for the "Conversion after trial lesson" form.

use chrono::NaiveDate;

use super::checks::{FormChecks, TaskView};
use super::{CheckMode, RuleEngine, RuleError, RuleViolations, ViolationCategory};
use crate::attendance::{is_completion_marker, is_negative_answer};
use crate::extract::ExtractFn;
use crate::field::{Field, FormSchema};
use crate::forms::FormDefinition;

/// Engine for trial-lesson conversions.
///
/// - `general`: teacher, branch and PE status
/// - `rule3`: attendance answers are due once the lesson date and time
///   are past the cutoff; a student marked as studying cannot have
///   missed the first lesson
pub struct TrialConversionRules {
    checks: FormChecks,
}

impl TrialConversionRules {
    pub fn new(definition: &FormDefinition) -> Self {
        Self {
            checks: FormChecks::new(definition),
        }
    }

    fn studying_contradiction(&self, task: &TaskView<'_>, out: &mut RuleViolations) {
        let (Some(completion), Some(first_lesson)) = (
            self.checks.completion_field(),
            self.checks.settings.lessons.first(),
        ) else {
            return;
        };
        if !task.in_template(first_lesson.answer_field) {
            return;
        }

        let answer = task.read(first_lesson.answer_field);
        if is_completion_marker(&task.read(completion)) && is_negative_answer(&answer) {
            out.push(
                ViolationCategory::Rule3,
                format!(
                    "{} is set although {} is '{}'",
                    self.checks.describe(completion),
                    self.checks.describe(first_lesson.answer_field),
                    answer
                ),
            );
        }
    }
}

impl RuleEngine for TrialConversionRules {
    fn form_id(&self) -> u64 {
        self.checks.form_id
    }

    fn name(&self) -> &str {
        "trial-conversion"
    }

    fn check(
        &self,
        schema: &FormSchema,
        fields: &[Field],
        extract: ExtractFn,
        reference_date: NaiveDate,
        mode: CheckMode,
    ) -> Result<RuleViolations, RuleError> {
        let task = self.checks.view(schema, fields, extract);

        let mut violations = RuleViolations::new();
        self.checks.general(&task, &mut violations);
        self.checks
            .overdue_lessons(&task, mode.cutoff(reference_date), &mut violations);
        self.studying_contradiction(&task, &mut violations);
        Ok(violations)
    }
}
