//! Analysis report assembly.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::attendance::AttendanceVerdict;
use crate::extract::ExtractFn;
use crate::field::{FieldValue, Task};
use crate::forms::FormDefinition;

/// Ordered label → value mapping, serialized as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledValues<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for LabeledValues<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> LabeledValues<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: V) {
        self.entries.push((label.into(), value));
    }

    pub fn get(&self, label: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for LabeledValues<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// Key used for a field in report mappings.
pub fn labeled_key(label: &str, field_id: u64) -> String {
    format!("{} (ID:{})", label, field_id)
}

/// Link to a task in the platform's web UI.
pub fn task_link(base: &str, task_id: u64) -> String {
    format!("{}{}", base, task_id)
}

/// Whether the flag that brought the task to attention holds up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conclusion {
    /// Rule violations plus one for an attendance problem
    pub problem_count: usize,
    pub justified: bool,
}

impl Conclusion {
    pub fn new(rule_violations: usize, attendance_problem: bool) -> Self {
        let problem_count = rule_violations + usize::from(attendance_problem);
        Self {
            problem_count,
            justified: problem_count > 0,
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.justified {
            write!(f, "{} problem(s) found: the flag is justified", self.problem_count)
        } else {
            write!(f, "no problems found: the task was flagged in error")
        }
    }
}

/// Diagnosis of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub rule_violations: Vec<String>,
    pub attendance: AttendanceVerdict,
    pub important_fields: LabeledValues<FieldValue>,

    /// Raw diagnostic dump keyed by "name (ID:n)"
    pub all_fields: LabeledValues<Value>,

    /// Functionality that was unavailable for this form
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<String>,

    pub conclusion: Conclusion,
}

/// Full report for one analyzed task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub task_id: u64,
    pub form_id: u64,
    pub form_name: String,
    pub task_title: String,
    pub task_link: String,
    pub fields_count: usize,
    pub analysis: Analysis,
}

impl AnalysisReport {
    pub fn problem_count(&self) -> usize {
        self.analysis.conclusion.problem_count
    }

    pub fn is_justified(&self) -> bool {
        self.analysis.conclusion.justified
    }
}

/// Result of `analyze`: a report or a single top-level error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Report(Box<AnalysisReport>),
    Error { error: String },
}

impl AnalysisOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        AnalysisOutcome::Error {
            error: message.into(),
        }
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisOutcome::Report(report) => Some(report),
            AnalysisOutcome::Error { .. } => None,
        }
    }
}

impl From<AnalysisReport> for AnalysisOutcome {
    fn from(report: AnalysisReport) -> Self {
        AnalysisOutcome::Report(Box::new(report))
    }
}

/// Assembles an [`AnalysisReport`] from the pieces the analyzer collects.
pub struct ReportBuilder<'a> {
    task: &'a Task,
    form_id: u64,
    form_name: String,
    definition: Option<&'a FormDefinition>,
    link_base: String,
    rule_violations: Vec<String>,
    attendance: AttendanceVerdict,
    gaps: Vec<String>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(task: &'a Task, form_id: u64) -> Self {
        Self {
            task,
            form_id,
            form_name: format!("Form {}", form_id),
            definition: None,
            link_base: String::new(),
            rule_violations: Vec::new(),
            attendance: AttendanceVerdict::clear(),
            gaps: Vec::new(),
        }
    }

    pub fn form_name(mut self, name: impl Into<String>) -> Self {
        self.form_name = name.into();
        self
    }

    /// Static form definition providing the important-field labels.
    pub fn definition(mut self, definition: Option<&'a FormDefinition>) -> Self {
        self.definition = definition;
        self
    }

    pub fn link_base(mut self, base: impl Into<String>) -> Self {
        self.link_base = base.into();
        self
    }

    pub fn rule_violations(mut self, violations: Vec<String>) -> Self {
        self.rule_violations = violations;
        self
    }

    pub fn attendance(mut self, verdict: AttendanceVerdict) -> Self {
        self.attendance = verdict;
        self
    }

    pub fn gaps(mut self, gaps: Vec<String>) -> Self {
        self.gaps = gaps;
        self
    }

    pub fn build(self, extract: ExtractFn) -> AnalysisReport {
        let fields = &self.task.fields;

        let mut important_fields = LabeledValues::new();
        if let Some(definition) = self.definition {
            for label in &definition.field_labels {
                important_fields.insert(
                    labeled_key(&label.label, label.id),
                    extract(fields, label.id),
                );
            }
        }

        let mut all_fields = LabeledValues::new();
        for field in fields {
            all_fields.insert(
                labeled_key(&field.display_name(), field.id),
                field.value.clone(),
            );
        }

        let conclusion = Conclusion::new(self.rule_violations.len(), self.attendance.has_problem);

        AnalysisReport {
            task_id: self.task.id,
            form_id: self.form_id,
            form_name: self.form_name,
            task_title: self.task.title.clone(),
            task_link: task_link(&self.link_base, self.task.id),
            fields_count: fields.len(),
            analysis: Analysis {
                rule_violations: self.rule_violations,
                attendance: self.attendance,
                important_fields,
                all_fields,
                gaps: self.gaps,
                conclusion,
            },
        }
    }
}
