//! # taskcheck-core
//!
//! Deterministic diagnosis of tasks flagged by the attendance report.
//!
//! Given a task's raw fields this crate answers:
//! - What does each field actually contain?
//! - Is there a genuine attendance problem, or was it resolved?
//! - Which form rules does the task violate?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same fields, same form id, same reference date
//!    always produce the same report
//! 2. **Never fails on field data**: unexpected shapes degrade to
//!    `Raw`/`Missing`
//! 3. **Overrides short-circuit**: a completion or exclusion override
//!    resolves the attendance control before any check field is read
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskcheck_core::{extract, AttendanceController, Field, FormRegistry};
//!
//! let registry = Arc::new(FormRegistry::builtin()?);
//! let controller = AttendanceController::new(registry, extract);
//! let fields = vec![Field::new(183, "Attended 1st lesson?", "No")];
//! let verdict = controller.evaluate(&fields, 792300);
//! assert!(verdict.has_problem);
//! ```

pub mod attendance;
pub mod extract;
pub mod field;
pub mod forms;
pub mod report;
pub mod rules;

pub use attendance::{
    evaluate_control, is_completion_marker, is_negative_answer, AttendanceController,
    AttendanceVerdict, ControlOverride,
};
pub use extract::{extract, normalize, resolve_text, ExtractFn};
pub use field::{Field, FieldValue, FormSchema, SchemaField, Task};
pub use forms::{
    Capabilities, FormDefinition, FormRegistry, FormRuleConfig, FormsConfig, FormsConfigError,
    RETURNING_STUDENTS_FORM_ID, TRIAL_CONVERSION_FORM_ID,
};
pub use report::{
    labeled_key, task_link, Analysis, AnalysisOutcome, AnalysisReport, Conclusion,
    LabeledValues, ReportBuilder,
};
pub use rules::{
    reference_date, CheckMode, RuleEngine, RuleError, RuleViolations, ViolationCategory,
};
