//! Rules for the "Returning students" form.

use chrono::NaiveDate;

use super::checks::{FormChecks, TaskView};
use super::{CheckMode, RuleEngine, RuleError, RuleViolations, ViolationCategory};
use crate::extract::ExtractFn;
use crate::field::{Field, FormSchema};
use crate::forms::FormDefinition;

/// Engine for returning students.
///
/// - `general`: teacher, branch and PE status
/// - `rule3`: lesson results must be filled once the lesson is past the
///   cutoff, and in order (no later lesson answered while an earlier one
///   is blank)
pub struct ReturningStudentsRules {
    checks: FormChecks,
}

impl ReturningStudentsRules {
    pub fn new(definition: &FormDefinition) -> Self {
        Self {
            checks: FormChecks::new(definition),
        }
    }

    fn answer_order(&self, task: &TaskView<'_>, out: &mut RuleViolations) {
        let answers: Vec<(u64, bool)> = self
            .checks
            .settings
            .lessons
            .iter()
            .filter(|l| task.in_template(l.answer_field))
            .map(|l| (l.answer_field, task.read(l.answer_field).is_filled()))
            .collect();

        let Some(first_blank) = answers.iter().position(|(_, filled)| !filled) else {
            return;
        };
        let blank_id = answers[first_blank].0;

        for (answer_id, filled) in &answers[first_blank + 1..] {
            if *filled {
                out.push(
                    ViolationCategory::Rule3,
                    format!(
                        "{} is answered while {} is still blank",
                        self.checks.describe(*answer_id),
                        self.checks.describe(blank_id)
                    ),
                );
            }
        }
    }
}

impl RuleEngine for ReturningStudentsRules {
    fn form_id(&self) -> u64 {
        self.checks.form_id
    }

    fn name(&self) -> &str {
        "returning-students"
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
        self.answer_order(&task, &mut violations);
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{FormsConfig, RETURNING_STUDENTS_FORM_ID};
    use crate::extract::extract;
    use serde_json::json;

    fn engine() -> ReturningStudentsRules {
        let config = FormsConfig::builtin().unwrap();
        let def = config
            .forms
            .iter()
            .find(|f| f.id == RETURNING_STUDENTS_FORM_ID)
            .unwrap();
        ReturningStudentsRules::new(def)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 14).unwrap()
    }

    fn complete_fields() -> Vec<Field> {
        vec![
            Field::new(8, "Teacher", json!({ "first_name": "Anna", "last_name": "Petrova" })),
            Field::new(5, "Branch", json!({ "values": ["Lenina 5"] })),
            Field::new(7, "PE status", json!({ "choice_names": ["PE Start"] })),
        ]
    }

    #[test]
    fn test_clean_task_has_no_violations() {
        let result = engine()
            .check(&FormSchema::placeholder(RETURNING_STUDENTS_FORM_ID), &complete_fields(), extract, day(), CheckMode::Yesterday12)
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_missing_standard_fields() {
        let fields = vec![Field::new(7, "PE status", json!({ "choice_names": ["Lost"] }))];
        let result = engine()
            .check(&FormSchema::placeholder(RETURNING_STUDENTS_FORM_ID), &fields, extract, day(), CheckMode::Yesterday12)
            .unwrap();

        assert_eq!(result.general.len(), 3);
        assert_eq!(result.general[0], "Teacher (ID:8) is not filled");
        assert_eq!(result.general[1], "Branch (ID:5) is not filled");
        assert!(result.general[2].starts_with("PE status (ID:7) is 'Lost'"));
        assert!(result.rule3.is_empty());
    }

    #[test]
    fn test_overdue_lesson_is_rule3() {
        let mut fields = complete_fields();
        fields.push(Field::new(26, "1st lesson date", "2025-09-13"));
        fields.push(Field::new(31, "2nd lesson date", "2025-09-20"));

        let result = engine()
            .check(&FormSchema::placeholder(RETURNING_STUDENTS_FORM_ID), &fields, extract, day(), CheckMode::Yesterday12)
            .unwrap();

        assert_eq!(
            result.rule3,
            vec!["Did the 1st lesson happen? (ID:27) is not filled although the lesson was on 2025-09-13".to_string()]
        );
    }

    #[test]
    fn test_mode_changes_cutoff() {
        let mut fields = complete_fields();
        // Date-only lessons start at midnight, so the reference day itself
        // is before both cutoffs.
        fields.push(Field::new(26, "1st lesson date", "2025-09-14"));
        let yesterday12 = engine()
            .check(&FormSchema::placeholder(RETURNING_STUDENTS_FORM_ID), &fields, extract, day(), CheckMode::Yesterday12)
            .unwrap();
        assert_eq!(yesterday12.rule3.len(), 1);

        fields[3] = Field::new(26, "1st lesson date", "2025-09-15");
        let end_of_day = engine()
            .check(&FormSchema::placeholder(RETURNING_STUDENTS_FORM_ID), &fields, extract, day(), CheckMode::EndOfDay)
            .unwrap();
        assert!(end_of_day.rule3.is_empty());
    }

    #[test]
    fn test_out_of_order_answers() {
        let mut fields = complete_fields();
        fields.push(Field::new(27, "1st", "Yes"));
        fields.push(Field::new(50, "3rd", "No"));

        let result = engine()
            .check(&FormSchema::placeholder(RETURNING_STUDENTS_FORM_ID), &fields, extract, day(), CheckMode::Yesterday12)
            .unwrap();

        assert_eq!(
            result.rule3,
            vec!["Did the 3rd lesson happen? (ID:50) is answered while Did the 2nd lesson happen? (ID:32) is still blank".to_string()]
        );
    }

    #[test]
    fn test_malformed_values_do_not_fail() {
        let fields = vec![
            Field::new(8, "Teacher", json!([1, 2, 3])),
            Field::new(26, "1st lesson date", json!({ "weird": true })),
            Field::new(7, "PE status", json!(17)),
        ];
        let result = engine().check(&FormSchema::placeholder(RETURNING_STUDENTS_FORM_ID), &fields, extract, day(), CheckMode::Yesterday12);
        assert!(result.is_ok());
    }

    #[test]
    fn test_field_missing_from_template_skips_only_its_checks() {
        // Template knows the standard fields and lessons 1-2, not 3-4
        let schema = FormSchema::from_value(
            RETURNING_STUDENTS_FORM_ID,
            &json!({ "name": "Returning", "fields": [
                { "id": 8, "name": "Teacher" },
                { "id": 5, "name": "Branch" },
                { "id": 7, "name": "PE status" },
                { "id": 26 }, { "id": 27 }, { "id": 31 }, { "id": 32 }
            ] }),
        );
        let fields = vec![
            Field::new(7, "PE status", json!({ "choice_names": ["Lost"] })),
            Field::new(26, "1st lesson date", "2025-09-13"),
            Field::new(57, "4th", "Yes"),
        ];

        let result = engine()
            .check(&schema, &fields, extract, day(), CheckMode::Yesterday12)
            .unwrap();

        assert_eq!(result.general.len(), 3);
        assert_eq!(result.general[0], "Teacher (ID:8) is not filled");
        assert_eq!(result.general[1], "Branch (ID:5) is not filled");
        assert_eq!(
            result.rule3,
            vec!["Did the 1st lesson happen? (ID:27) is not filled although the lesson was on 2025-09-13".to_string()]
        );
    }
}
